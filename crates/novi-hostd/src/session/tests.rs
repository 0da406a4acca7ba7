use std::collections::BTreeSet;

use rstest::{fixture, rstest};

use super::*;

#[fixture]
fn service() -> LocalSessionService {
    LocalSessionService::new("hunter2")
}

fn permissions(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|item| (*item).to_owned()).collect()
}

fn session_for(
    service: &LocalSessionService,
    identifier: &str,
    grant: &[&str],
    elevated: bool,
) -> SessionToken {
    let principal = service
        .provision(identifier, &permissions(grant), elevated)
        .expect("provision");
    service.login_as(&principal).expect("login")
}

#[rstest]
fn master_key_must_match(service: LocalSessionService) {
    assert_eq!(
        service.authenticate("guess"),
        Err(SessionError::InvalidMasterKey)
    );
    let token = service.authenticate("hunter2").expect("master session");
    assert_eq!(
        service.authorize(&token, "plugin.restart"),
        Ok(Subject::Master)
    );
}

#[rstest]
fn principals_are_limited_to_their_grant(service: LocalSessionService) {
    let token = session_for(&service, "alpha", &["plugin.list"], false);
    assert_eq!(
        service.authorize(&token, "plugin.list"),
        Ok(Subject::Principal("alpha".into()))
    );
    assert!(matches!(
        service.authorize(&token, "plugin.restart"),
        Err(SessionError::PermissionDenied { subject, .. }) if subject == "alpha"
    ));
}

#[rstest]
fn elevated_principals_pass_every_check(service: LocalSessionService) {
    let token = session_for(&service, "admin", &[], true);
    assert!(service.authorize(&token, "plugin.restart").is_ok());
}

#[rstest]
fn provisioning_replaces_the_previous_grant(service: LocalSessionService) {
    let token = session_for(&service, "alpha", &["plugin.list", "files.read"], false);
    service
        .provision("alpha", &permissions(&["files.read"]), false)
        .expect("reprovision");
    assert_eq!(
        service.grant("alpha").map(|grant| grant.permissions),
        Some(permissions(&["files.read"]))
    );
    assert!(service.authorize(&token, "plugin.list").is_err());
}

#[rstest]
fn each_login_issues_a_distinct_token(service: LocalSessionService) {
    let first = session_for(&service, "alpha", &[], false);
    let second = service
        .login_as(&Principal::new("alpha", false))
        .expect("second login");
    assert_ne!(first.expose(), second.expose());
}

#[rstest]
fn unknown_tokens_and_principals_are_rejected(service: LocalSessionService) {
    assert_eq!(
        service.authorize(&SessionToken::new("forged"), "plugin.list"),
        Err(SessionError::UnknownSession)
    );
    assert!(matches!(
        service.login_as(&Principal::new("ghost", false)),
        Err(ProvisioningError::Denied { .. })
    ));
}
