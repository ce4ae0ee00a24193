//! Operator access levels and the engineering login check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessLevel {
    #[default]
    Operator,
    Engineering,
}

/// Engineering login, stored in `access.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// No username configured: nothing to log in against.
    pub fn is_configured(&self) -> bool {
        !self.username.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub level: AccessLevel,
    pub since: DateTime<Utc>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// Wrong username or password. Deliberately carries no detail.
    #[error("Login rejected")]
    Rejected,

    #[error("{required:?} access required")]
    Insufficient { required: AccessLevel },
}

/// Check a login attempt against the stored credentials.
///
/// Both fields must match exactly. An unconfigured store rejects every
/// attempt.
pub fn login(credentials: &Credentials, username: &str, password: &str) -> Result<Session, AccessError> {
    if credentials.is_configured()
        && credentials.username == username
        && credentials.password == password
    {
        Ok(Session {
            level: AccessLevel::Engineering,
            since: Utc::now(),
        })
    } else {
        Err(AccessError::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            username: "eng".to_string(),
            password: "s3cret".to_string(),
        }
    }

    #[test]
    fn test_exact_match_grants_engineering() {
        let session = login(&creds(), "eng", "s3cret").unwrap();
        assert_eq!(session.level, AccessLevel::Engineering);
    }

    #[test]
    fn test_mismatch_rejected() {
        assert_eq!(login(&creds(), "eng", "S3cret"), Err(AccessError::Rejected));
        assert_eq!(login(&creds(), "eng ", "s3cret"), Err(AccessError::Rejected));
        assert_eq!(login(&creds(), "", ""), Err(AccessError::Rejected));
    }

    #[test]
    fn test_unconfigured_rejects_everything() {
        assert_eq!(
            login(&Credentials::default(), "", ""),
            Err(AccessError::Rejected)
        );
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(AccessLevel::Engineering > AccessLevel::Operator);
        assert_eq!(AccessLevel::default(), AccessLevel::Operator);
    }
}
