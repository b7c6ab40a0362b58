//! Permissions, sessions, and policy

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operations a session may be allowed to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Delete,
    Export,
    Import,
    Backup,
    Restore,
    Encrypt,
    /// Implies every other permission
    Admin,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Delete => "delete",
            Permission::Export => "export",
            Permission::Import => "import",
            Permission::Backup => "backup",
            Permission::Restore => "restore",
            Permission::Encrypt => "encrypt",
            Permission::Admin => "admin",
        };
        f.write_str(s)
    }
}

/// An authenticated session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub permissions: BTreeSet<Permission>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Permission check honoring `admin`
    pub fn allows(&self, permission: Permission) -> bool {
        self.permissions.contains(&Permission::Admin) || self.permissions.contains(&permission)
    }
}

/// Lockout and session lifetime policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessPolicy {
    /// Failed attempts that trigger a lockout
    pub max_failed_attempts: u32,
    /// Lockout length, counted from the last failed attempt
    pub lockout_minutes: i64,
    pub session_ttl_minutes: i64,
    /// Authentication attempts kept in the access log
    pub access_log_capacity: usize,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_minutes: 15,
            session_ttl_minutes: 60,
            access_log_capacity: 1_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(perms: &[Permission]) -> Session {
        let now = Utc::now();
        Session {
            token: "t".to_string(),
            username: "alice".to_string(),
            permissions: perms.iter().copied().collect(),
            created_at: now,
            expires_at: now + Duration::minutes(5),
        }
    }

    #[test]
    fn test_admin_implies_all() {
        let admin = session(&[Permission::Admin]);
        assert!(admin.allows(Permission::Restore));
        assert!(admin.allows(Permission::Encrypt));

        let reader = session(&[Permission::Read]);
        assert!(reader.allows(Permission::Read));
        assert!(!reader.allows(Permission::Write));
    }

    #[test]
    fn test_policy_deserializes_with_defaults() {
        let policy: AccessPolicy = serde_json::from_str(r#"{"max_failed_attempts": 3}"#).unwrap();
        assert_eq!(policy.max_failed_attempts, 3);
        assert_eq!(policy.lockout_minutes, 15);
    }
}
