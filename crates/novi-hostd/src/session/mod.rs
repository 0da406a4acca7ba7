//! In-memory session service backing plugin identities and the control
//! surface.
//!
//! The host authenticates once with the master key. Every plugin then gets a
//! principal whose grant is replaced on each provisioning call, and a fresh
//! session token per login. Control requests carry a token; the service
//! answers whether it may use a given permission. Elevated principals and
//! the master session pass every check.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use novi_plugins::{IdentityProvisioner, Principal, ProvisioningError, SessionToken};

const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// Who a session token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    /// The host itself, authenticated with the master key.
    Master,
    /// A provisioned principal.
    Principal(String),
}

/// Errors raised by session checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The master key did not match.
    #[error("master key rejected")]
    InvalidMasterKey,
    /// The token is unknown or was never issued.
    #[error("unknown session")]
    UnknownSession,
    /// The subject lacks the permission.
    #[error("'{subject}' lacks permission '{permission}'")]
    PermissionDenied {
        /// Subject name.
        subject: String,
        /// Permission that was checked.
        permission: String,
    },
    /// The session table is unusable after a panic elsewhere.
    #[error("session service unavailable")]
    Unavailable,
}

/// Session operations used by the host and the control surface.
#[cfg_attr(test, mockall::automock)]
pub trait SessionService: Send + Sync {
    /// Opens the host's own session.
    fn authenticate(&self, master_key: &str) -> Result<SessionToken, SessionError>;

    /// Resolves `token` and checks that its subject may use `permission`.
    fn authorize(&self, token: &SessionToken, permission: &str) -> Result<Subject, SessionError>;
}

/// Grant held by a provisioned principal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrincipalGrant {
    /// Administrative role.
    pub elevated: bool,
    /// Exact permission set.
    pub permissions: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct SessionTable {
    principals: BTreeMap<String, PrincipalGrant>,
    sessions: HashMap<String, Subject>,
}

/// Session service keeping principals and sessions in memory.
#[derive(Debug)]
pub struct LocalSessionService {
    master_key: String,
    table: Mutex<SessionTable>,
}

impl LocalSessionService {
    /// Creates a service accepting `master_key`.
    #[must_use]
    pub fn new(master_key: impl Into<String>) -> Self {
        Self {
            master_key: master_key.into(),
            table: Mutex::new(SessionTable::default()),
        }
    }

    /// Current grant of `identifier`, if provisioned.
    #[must_use]
    pub fn grant(&self, identifier: &str) -> Option<PrincipalGrant> {
        self.lock().ok()?.principals.get(identifier).cloned()
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionTable>, SessionError> {
        self.table.lock().map_err(|_| SessionError::Unavailable)
    }

    fn issue(table: &mut SessionTable, subject: Subject) -> SessionToken {
        let raw = Uuid::new_v4().to_string();
        table.sessions.insert(raw.clone(), subject);
        SessionToken::new(raw)
    }
}

impl SessionService for LocalSessionService {
    fn authenticate(&self, master_key: &str) -> Result<SessionToken, SessionError> {
        if master_key != self.master_key {
            return Err(SessionError::InvalidMasterKey);
        }
        let mut table = self.lock()?;
        info!(target: SESSION_TARGET, "master session opened");
        Ok(Self::issue(&mut table, Subject::Master))
    }

    fn authorize(&self, token: &SessionToken, permission: &str) -> Result<Subject, SessionError> {
        let table = self.lock()?;
        let subject = table
            .sessions
            .get(token.expose())
            .cloned()
            .ok_or(SessionError::UnknownSession)?;
        let allowed = match &subject {
            Subject::Master => true,
            Subject::Principal(name) => table.principals.get(name).is_some_and(|grant| {
                grant.elevated || grant.permissions.contains(permission)
            }),
        };
        if allowed {
            Ok(subject)
        } else {
            let denied = match subject {
                Subject::Master => String::from("master"),
                Subject::Principal(name) => name,
            };
            Err(SessionError::PermissionDenied {
                subject: denied,
                permission: permission.to_owned(),
            })
        }
    }
}

impl IdentityProvisioner for LocalSessionService {
    fn provision(
        &self,
        identifier: &str,
        permissions: &BTreeSet<String>,
        elevated: bool,
    ) -> Result<Principal, ProvisioningError> {
        let mut table = self.lock()?;
        table.principals.insert(
            identifier.to_owned(),
            PrincipalGrant {
                elevated,
                permissions: permissions.clone(),
            },
        );
        debug!(
            target: SESSION_TARGET,
            principal = identifier,
            elevated,
            permissions = ?permissions,
            "principal provisioned"
        );
        Ok(Principal::new(identifier, elevated))
    }

    fn login_as(&self, principal: &Principal) -> Result<SessionToken, ProvisioningError> {
        let mut table = self.lock()?;
        if !table.principals.contains_key(principal.name()) {
            return Err(ProvisioningError::Denied {
                identifier: principal.name().to_owned(),
                message: "principal is not provisioned".into(),
            });
        }
        Ok(Self::issue(
            &mut table,
            Subject::Principal(principal.name().to_owned()),
        ))
    }
}

impl From<SessionError> for ProvisioningError {
    fn from(error: SessionError) -> Self {
        Self::Unreachable {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests;
