//! Persistence backends for the configuration engine
//!
//! Versions, backups, and other records are stored as opaque byte values
//! grouped into named collections. Two backends are provided:
//!
//! - [`MemoryStorage`]: process-local maps, the default for tests and
//!   short-lived managers
//! - [`SledStorage`]: an embedded sled database, one tree per collection
//!
//! Both implement the async [`Storage`] trait so managers can be written
//! once and handed either backend at construction time.
//!
//! # Example
//!
//! ```rust,no_run
//! use sysconf_storage::{MemoryStorage, Storage};
//!
//! # async fn demo() -> sysconf_storage::StorageResult<()> {
//! let storage = MemoryStorage::new();
//! storage.put("backups", "b-1", b"{}".to_vec()).await?;
//! assert!(storage.get("backups", "b-1").await?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod json;
pub mod memory;
pub mod sled_store;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use json::{get_json, list_json, put_json};
pub use memory::MemoryStorage;
pub use sled_store::SledStorage;
pub use traits::Storage;
