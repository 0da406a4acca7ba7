use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use novi_plugins::SessionToken;

use super::*;

struct ScriptDir {
    dir: TempDir,
}

impl ScriptDir {
    fn context(&self) -> ClientContext {
        ClientContext {
            identifier: "alpha".into(),
            server: "unix:/tmp/novi.socket".into(),
            identity: SessionToken::new("secret-token"),
            gateway: "http://127.0.0.1:8080".into(),
            data_dir: self.dir.path().to_path_buf(),
            config_template: None,
        }
    }

    fn script(&self, body: &str) -> PathBuf {
        let path = self.dir.path().join("main");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut permissions = fs::metadata(&path).expect("metadata").permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&path, permissions).expect("chmod");
        path
    }
}

#[fixture]
fn scripts() -> ScriptDir {
    ScriptDir {
        dir: TempDir::new().expect("temp dir"),
    }
}

#[rstest]
fn script_sees_context_in_its_environment(scripts: ScriptDir) {
    let script = scripts.script("printf '%s %s' \"$NOVI_PLUGIN_ID\" \"$NOVI_IDENTITY\" > seen");
    run_script(&script, &scripts.context()).expect("script should succeed");
    let seen = fs::read_to_string(scripts.dir.path().join("seen")).expect("output file");
    assert_eq!(seen, "alpha secret-token");
}

#[rstest]
fn nonzero_exit_is_reported(scripts: ScriptDir) {
    let script = scripts.script("exit 4");
    let error = run_script(&script, &scripts.context()).expect_err("script should fail");
    assert!(matches!(error, WorkerError::ScriptFailed { status, .. } if status.code() == Some(4)));
}

#[rstest]
fn missing_script_is_reported(scripts: ScriptDir) {
    let missing = scripts.dir.path().join("absent");
    let error = run_script(&missing, &scripts.context()).expect_err("script is absent");
    assert!(matches!(error, WorkerError::Script { .. }));
}
