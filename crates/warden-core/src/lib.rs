pub mod auth;
pub mod error;
pub mod password;
pub mod throttle;
pub mod token;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use warden_db::DbPool;

use crate::error::AuthError;
use crate::token::AuthKeys;

/// Closed set of roles carried in access-token claims and the users table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::User => "USER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ADMIN" => Ok(Role::Admin),
            "USER" => Ok(Role::User),
            other => Err(AuthError::Internal(format!("unknown role '{other}'"))),
        }
    }
}

/// True when `role` is contained in the allowed set. An empty set means any
/// authenticated role is acceptable.
pub fn is_authorized(role: Role, allowed: &[Role]) -> bool {
    allowed.is_empty() || allowed.contains(&role)
}

/// Delivery channel for freshly minted reset tokens. Implementations must not
/// persist the raw token.
pub trait ResetNotifier: Send + Sync {
    fn deliver(&self, email: &str, raw_token: &str);
}

/// Default notifier: records that a token was issued without exposing it.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl ResetNotifier for LogNotifier {
    fn deliver(&self, email: &str, _raw_token: &str) {
        tracing::debug!(email = %email, "password reset token issued");
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Server-held secret mixed into password hashing and token fingerprints.
    pub token_pepper: String,
    pub access_token_ttl_seconds: u64,
    pub refresh_token_ttl_seconds: u64,
    pub reset_token_ttl_seconds: u64,
    pub cookie_secure: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub keys: AuthKeys,
    pub notifier: Arc<dyn ResetNotifier>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_roundtrips_through_storage_form() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("USER".parse::<Role>().unwrap(), Role::User);
        assert_eq!(Role::Admin.as_str(), "ADMIN");
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn authorization_checks_membership() {
        assert!(is_authorized(Role::Admin, &[Role::Admin]));
        assert!(!is_authorized(Role::User, &[Role::Admin]));
        assert!(is_authorized(Role::User, &[Role::Admin, Role::User]));
        assert!(is_authorized(Role::User, &[]));
    }
}
