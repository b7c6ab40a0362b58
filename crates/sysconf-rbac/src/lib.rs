//! Session-based access control for the configuration engine
//!
//! Users authenticate with a password (stored as an Argon2 PHC hash) and
//! receive a time-limited [`Session`]. Every mutating engine operation checks
//! the session's permission set; `admin` implies every other permission.
//!
//! Repeated failed logins lock an account: once the failed-attempt counter
//! reaches the policy threshold, further attempts (even with the correct
//! password) fail with [`AccessError::LockedOut`] until the lockout window,
//! measured from the *last* failed attempt, has elapsed.

pub mod control;
pub mod error;
pub mod password;
pub mod types;

pub use control::{AccessControl, AccessLogEntry};
pub use error::{AccessError, Result};
pub use password::{hash_password, verify_password};
pub use types::{AccessPolicy, Permission, Session};
