//! Identity provisioning consumed before each plugin is spawned.
//!
//! Every plugin runs as its own principal. The host asks an
//! [`IdentityProvisioner`] to look up or create that principal, replace its
//! permission grant, and issue a session token that is handed to the worker.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProvisioningError;

/// A principal owned by one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    name: String,
    elevated: bool,
}

impl Principal {
    /// Creates a principal handle.
    #[must_use]
    pub fn new(name: impl Into<String>, elevated: bool) -> Self {
        Self {
            name: name.into(),
            elevated,
        }
    }

    /// Principal name; equal to the plugin identifier.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Whether the principal holds the administrative role.
    #[must_use]
    pub const fn is_elevated(&self) -> bool {
        self.elevated
    }
}

/// Opaque session credential.
///
/// `Debug` never prints the secret so configurations can be logged.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wraps a raw token.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the raw token.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("SessionToken(<redacted>)")
    }
}

/// Session-service operations the host needs per plugin.
#[cfg_attr(test, mockall::automock)]
pub trait IdentityProvisioner {
    /// Looks up or creates the principal named `identifier` and replaces its
    /// grant with exactly `permissions`. `elevated` adds the administrative
    /// role.
    fn provision(
        &self,
        identifier: &str,
        permissions: &BTreeSet<String>,
        elevated: bool,
    ) -> Result<Principal, ProvisioningError>;

    /// Opens a session as `principal`.
    fn login_as(&self, principal: &Principal) -> Result<SessionToken, ProvisioningError>;
}

impl<T: IdentityProvisioner + ?Sized> IdentityProvisioner for &T {
    fn provision(
        &self,
        identifier: &str,
        permissions: &BTreeSet<String>,
        elevated: bool,
    ) -> Result<Principal, ProvisioningError> {
        (**self).provision(identifier, permissions, elevated)
    }

    fn login_as(&self, principal: &Principal) -> Result<SessionToken, ProvisioningError> {
        (**self).login_as(principal)
    }
}

/// Provisions a principal and logs in as it.
pub(crate) fn provision_session<P: IdentityProvisioner + ?Sized>(
    provisioner: &P,
    identifier: &str,
    permissions: &BTreeSet<String>,
    elevated: bool,
) -> Result<SessionToken, ProvisioningError> {
    let principal = provisioner.provision(identifier, permissions, elevated)?;
    provisioner.login_as(&principal)
}
