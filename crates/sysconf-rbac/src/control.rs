//! User registry, authentication, and session management

use std::collections::{BTreeSet, HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AccessError, Result};
use crate::password::{hash_password, verify_password};
use crate::types::{AccessPolicy, Permission, Session};

/// One authentication attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub success: bool,
    pub reason: String,
}

#[derive(Debug, Clone)]
struct UserAccount {
    password_hash: String,
    permissions: BTreeSet<Permission>,
    failed_attempts: u32,
    last_failed_at: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
}

impl UserAccount {
    fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.map(|until| now < until).unwrap_or(false)
    }
}

/// Users, their lockout state, and live sessions
#[derive(Debug, Default)]
pub struct AccessControl {
    policy: AccessPolicy,
    users: HashMap<String, UserAccount>,
    sessions: HashMap<String, Session>,
    access_log: VecDeque<AccessLogEntry>,
}

impl AccessControl {
    pub fn new(policy: AccessPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Register a user with a password and a permission set
    pub fn add_user(
        &mut self,
        username: impl Into<String>,
        password: &str,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Result<()> {
        let username = username.into();
        if self.users.contains_key(&username) {
            return Err(AccessError::UserExists(username));
        }
        let account = UserAccount {
            password_hash: hash_password(password)?,
            permissions: permissions.into_iter().collect(),
            failed_attempts: 0,
            last_failed_at: None,
            locked_until: None,
        };
        info!(username = %username, "User registered");
        self.users.insert(username, account);
        Ok(())
    }

    pub fn has_user(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    pub fn authenticate(&mut self, username: &str, password: &str) -> Result<Session> {
        self.authenticate_at(username, password, Utc::now())
    }

    /// Authenticate against the clock `now`
    ///
    /// While an account is locked every attempt fails with
    /// [`AccessError::LockedOut`]; wrong passwords during the lockout push
    /// the window further out.
    pub fn authenticate_at(
        &mut self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let max_attempts = self.policy.max_failed_attempts;
        let lockout = Duration::minutes(self.policy.lockout_minutes);

        let Some(account) = self.users.get_mut(username) else {
            self.record(username, false, "unknown user", now);
            return Err(AccessError::InvalidCredentials {
                remaining_attempts: None,
            });
        };

        let was_locked = account.is_locked_at(now);
        if !was_locked && account.locked_until.is_some() {
            // lockout window elapsed
            account.failed_attempts = 0;
            account.locked_until = None;
        }

        let verified = verify_password(&account.password_hash, password)?;

        if was_locked {
            if !verified {
                account.failed_attempts = account.failed_attempts.saturating_add(1);
                account.last_failed_at = Some(now);
                account.locked_until = Some(now + lockout);
            }
            let until = account.locked_until.unwrap_or(now + lockout);
            warn!(username = %username, until = %until, "Authentication rejected: account locked");
            self.record(username, false, "account locked", now);
            return Err(AccessError::LockedOut { until });
        }

        if !verified {
            account.failed_attempts = account.failed_attempts.saturating_add(1);
            account.last_failed_at = Some(now);

            if account.failed_attempts >= max_attempts {
                let until = now + lockout;
                account.locked_until = Some(until);
                warn!(
                    username = %username,
                    attempts = account.failed_attempts,
                    until = %until,
                    "Account locked after repeated failures"
                );
                self.record(username, false, "invalid password; account locked", now);
                return Err(AccessError::LockedOut { until });
            }

            let remaining = max_attempts - account.failed_attempts;
            debug!(username = %username, remaining, "Authentication failed");
            self.record(username, false, "invalid password", now);
            return Err(AccessError::InvalidCredentials {
                remaining_attempts: Some(remaining),
            });
        }

        account.failed_attempts = 0;
        account.last_failed_at = None;
        account.locked_until = None;

        let session = Session {
            token: Uuid::new_v4().simple().to_string(),
            username: username.to_string(),
            permissions: account.permissions.clone(),
            created_at: now,
            expires_at: now + Duration::minutes(self.policy.session_ttl_minutes),
        };
        self.sessions.insert(session.token.clone(), session.clone());
        info!(username = %username, "Session created");
        self.record(username, true, "authenticated", now);
        Ok(session)
    }

    /// Whether the account is locked at `now`
    pub fn is_locked_at(&self, username: &str, now: DateTime<Utc>) -> bool {
        self.users
            .get(username)
            .map(|a| a.is_locked_at(now))
            .unwrap_or(false)
    }

    pub fn failed_attempts(&self, username: &str) -> u32 {
        self.users
            .get(username)
            .map(|a| a.failed_attempts)
            .unwrap_or(0)
    }

    /// Look up a live session, removing it if it has expired
    pub fn validate_session_at(&mut self, token: &str, now: DateTime<Utc>) -> Result<Session> {
        match self.sessions.get(token) {
            None => Err(AccessError::SessionNotFound),
            Some(session) if session.is_expired_at(now) => {
                debug!(username = %session.username, "Session expired");
                self.sessions.remove(token);
                Err(AccessError::SessionExpired)
            }
            Some(session) => Ok(session.clone()),
        }
    }

    pub fn validate_session(&mut self, token: &str) -> Result<Session> {
        self.validate_session_at(token, Utc::now())
    }

    pub fn has_permission(&mut self, token: &str, permission: Permission) -> bool {
        self.has_permission_at(token, permission, Utc::now())
    }

    /// Permission check; an expired session is deleted and yields `false`
    pub fn has_permission_at(
        &mut self,
        token: &str,
        permission: Permission,
        now: DateTime<Utc>,
    ) -> bool {
        self.validate_session_at(token, now)
            .map(|s| s.allows(permission))
            .unwrap_or(false)
    }

    /// Like [`has_permission`](Self::has_permission) but returns the session
    /// or the reason for refusal
    pub fn require_permission(&mut self, token: &str, permission: Permission) -> Result<Session> {
        let session = self.validate_session(token)?;
        if session.allows(permission) {
            Ok(session)
        } else {
            warn!(username = %session.username, permission = %permission, "Permission denied");
            Err(AccessError::PermissionDenied { permission })
        }
    }

    /// Drop a session; returns whether it existed
    pub fn logout(&mut self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Remove every session expired at `now`
    pub fn purge_expired_sessions(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired_at(now));
        before - self.sessions.len()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Recent authentication attempts, oldest first
    pub fn access_log(&self) -> impl Iterator<Item = &AccessLogEntry> {
        self.access_log.iter()
    }

    fn record(&mut self, username: &str, success: bool, reason: &str, now: DateTime<Utc>) {
        self.access_log.push_back(AccessLogEntry {
            timestamp: now,
            username: username.to_string(),
            success,
            reason: reason.to_string(),
        });
        while self.access_log.len() > self.policy.access_log_capacity {
            self.access_log.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control() -> AccessControl {
        let mut ac = AccessControl::new(AccessPolicy::default());
        ac.add_user("alice", "s3cret", [Permission::Read, Permission::Write])
            .unwrap();
        ac
    }

    #[test]
    fn test_authenticate_success() {
        let mut ac = control();
        let session = ac.authenticate("alice", "s3cret").unwrap();
        assert_eq!(session.username, "alice");
        assert!(ac.has_permission(&session.token, Permission::Write));
        assert!(!ac.has_permission(&session.token, Permission::Restore));
    }

    #[test]
    fn test_unknown_user() {
        let mut ac = control();
        let err = ac.authenticate("mallory", "x").unwrap_err();
        assert_eq!(
            err,
            AccessError::InvalidCredentials {
                remaining_attempts: None
            }
        );
    }

    #[test]
    fn test_duplicate_user() {
        let mut ac = control();
        assert!(matches!(
            ac.add_user("alice", "other", []),
            Err(AccessError::UserExists(_))
        ));
    }

    #[test]
    fn test_lockout_after_five_failures() {
        let mut ac = control();
        let start = Utc::now();

        for i in 0..4 {
            let err = ac
                .authenticate_at("alice", "wrong", start + Duration::seconds(i))
                .unwrap_err();
            assert_eq!(
                err,
                AccessError::InvalidCredentials {
                    remaining_attempts: Some(4 - i as u32)
                }
            );
        }
        let fifth = start + Duration::seconds(4);
        let err = ac.authenticate_at("alice", "wrong", fifth).unwrap_err();
        assert!(err.is_locked_out());

        // correct password is still refused while locked
        let sixth = fifth + Duration::seconds(1);
        let err = ac.authenticate_at("alice", "s3cret", sixth).unwrap_err();
        assert_eq!(
            err,
            AccessError::LockedOut {
                until: fifth + Duration::minutes(15)
            }
        );
        assert!(ac.is_locked_at("alice", sixth));
    }

    #[test]
    fn test_lockout_expires() {
        let mut ac = control();
        let start = Utc::now();
        for i in 0..5 {
            let _ = ac.authenticate_at("alice", "wrong", start + Duration::seconds(i));
        }
        let later = start + Duration::minutes(20);
        assert!(!ac.is_locked_at("alice", later));
        let session = ac.authenticate_at("alice", "s3cret", later).unwrap();
        assert_eq!(session.username, "alice");
        assert_eq!(ac.failed_attempts("alice"), 0);
    }

    #[test]
    fn test_failure_during_lockout_extends_window() {
        let mut ac = control();
        let start = Utc::now();
        for i in 0..5 {
            let _ = ac.authenticate_at("alice", "wrong", start + Duration::seconds(i));
        }
        let retry = start + Duration::minutes(10);
        let err = ac.authenticate_at("alice", "wrong", retry).unwrap_err();
        assert_eq!(
            err,
            AccessError::LockedOut {
                until: retry + Duration::minutes(15)
            }
        );
        // original window would have ended by now
        assert!(ac.is_locked_at("alice", start + Duration::minutes(20)));
    }

    #[test]
    fn test_success_resets_counter() {
        let mut ac = control();
        let _ = ac.authenticate("alice", "wrong");
        let _ = ac.authenticate("alice", "wrong");
        assert_eq!(ac.failed_attempts("alice"), 2);
        ac.authenticate("alice", "s3cret").unwrap();
        assert_eq!(ac.failed_attempts("alice"), 0);
    }

    #[test]
    fn test_expired_session_is_removed() {
        let mut ac = control();
        let now = Utc::now();
        let session = ac.authenticate_at("alice", "s3cret", now).unwrap();
        assert_eq!(ac.active_sessions(), 1);

        let after = now + Duration::minutes(61);
        assert!(!ac.has_permission_at(&session.token, Permission::Read, after));
        assert_eq!(ac.active_sessions(), 0);
        assert_eq!(
            ac.validate_session_at(&session.token, after),
            Err(AccessError::SessionNotFound)
        );
    }

    #[test]
    fn test_admin_session_has_every_permission() {
        let mut ac = control();
        ac.add_user("root", "toor", [Permission::Admin]).unwrap();
        let session = ac.authenticate("root", "toor").unwrap();
        assert!(ac.has_permission(&session.token, Permission::Restore));
        assert!(ac.require_permission(&session.token, Permission::Encrypt).is_ok());
    }

    #[test]
    fn test_require_permission_denied() {
        let mut ac = control();
        let session = ac.authenticate("alice", "s3cret").unwrap();
        assert_eq!(
            ac.require_permission(&session.token, Permission::Backup),
            Err(AccessError::PermissionDenied {
                permission: Permission::Backup
            })
        );
    }

    #[test]
    fn test_logout_and_purge() {
        let mut ac = control();
        let now = Utc::now();
        let a = ac.authenticate_at("alice", "s3cret", now).unwrap();
        let _b = ac.authenticate_at("alice", "s3cret", now).unwrap();
        assert!(ac.logout(&a.token));
        assert!(!ac.logout(&a.token));
        assert_eq!(ac.purge_expired_sessions(now + Duration::hours(2)), 1);
        assert_eq!(ac.active_sessions(), 0);
    }

    #[test]
    fn test_access_log_is_bounded() {
        let mut ac = AccessControl::new(AccessPolicy {
            access_log_capacity: 3,
            max_failed_attempts: 100,
            ..Default::default()
        });
        ac.add_user("alice", "pw", [Permission::Read]).unwrap();
        for _ in 0..5 {
            let _ = ac.authenticate("alice", "nope");
        }
        assert_eq!(ac.access_log().count(), 3);
        assert!(ac.access_log().all(|e| !e.success));
    }
}
