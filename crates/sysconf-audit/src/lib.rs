//! Audit logging for the configuration engine
//!
//! Every configuration change, export, import, backup, restore, and security
//! event is appended to an [`AuditLogger`] as an [`AuditEvent`]. The log is
//! retention-bounded: on every write, entries older than the retention
//! window are purged and the oldest entries beyond the size cap are evicted.
//! There is no background sweep.
//!
//! The log can be exported as a JSON array or as CSV with the fixed column
//! order `timestamp, type, severity, username, action, resource, details`.

pub mod error;
pub mod event;
pub mod logger;

pub use error::{AuditError, Result};
pub use event::{AuditEvent, AuditEventType, AuditSeverity};
pub use logger::{AuditConfig, AuditFilter, AuditLogger, CSV_COLUMNS};
