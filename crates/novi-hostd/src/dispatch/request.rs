//! Request decoding for the control surface.

use serde::Deserialize;

use novi_plugins::SessionToken;

use super::errors::DispatchError;

/// Parsed control request.
#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    /// Method name, for example `plugin.list`.
    pub method: String,
    /// Session token of the caller.
    #[serde(default)]
    pub identity: Option<String>,
    /// Method arguments.
    #[serde(default)]
    pub arguments: RequestArguments,
}

/// Arguments understood by the control methods.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestArguments {
    /// Plugin targeted by `plugin.restart`.
    #[serde(default)]
    pub plugin: Option<String>,
}

/// Control methods. Each requires the permission of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Metadata and liveness of every loaded plugin.
    List,
    /// Cascading restart of one plugin.
    Restart,
}

impl Method {
    /// Parses a method name.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownMethod`] for any other name.
    pub fn parse(value: &str) -> Result<Self, DispatchError> {
        match value {
            "plugin.list" => Ok(Self::List),
            "plugin.restart" => Ok(Self::Restart),
            _ => Err(DispatchError::UnknownMethod {
                method: value.to_owned(),
            }),
        }
    }

    /// Wire name, which is also the required permission.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::List => "plugin.list",
            Self::Restart => "plugin.restart",
        }
    }
}

impl ControlRequest {
    /// Parses one JSONL line; trailing whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MalformedJsonl`] for empty lines and invalid
    /// JSON.
    pub fn parse(line: &[u8]) -> Result<Self, DispatchError> {
        let trimmed = line.trim_ascii_end();
        if trimmed.is_empty() {
            return Err(DispatchError::malformed("empty request line"));
        }
        serde_json::from_slice(trimmed).map_err(|error| DispatchError::malformed(error.to_string()))
    }

    /// Resolved method.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownMethod`] for unsupported methods.
    pub fn method(&self) -> Result<Method, DispatchError> {
        Method::parse(self.method.trim())
    }

    /// Caller's session token.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidStructure`] when the field is missing or
    /// blank.
    pub fn identity(&self) -> Result<SessionToken, DispatchError> {
        self.identity
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(SessionToken::new)
            .ok_or_else(|| DispatchError::invalid_structure("identity field is missing"))
    }

    /// Target plugin of `plugin.restart`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidArguments`] when no target is given.
    pub fn plugin(&self) -> Result<&str, DispatchError> {
        self.arguments
            .plugin
            .as_deref()
            .map(str::trim)
            .filter(|plugin| !plugin.is_empty())
            .ok_or_else(|| DispatchError::invalid_arguments("plugin.restart requires 'plugin'"))
    }
}
