//! The storage trait implemented by every backend

use std::fmt;

use crate::error::{StorageError, StorageResult};

/// Keyed byte storage grouped into collections
///
/// All methods are async so remote or disk-backed stores fit behind the same
/// interface. Operations are strictly request/response; implementations
/// must not spawn background work.
#[async_trait::async_trait]
pub trait Storage: Send + Sync + fmt::Debug {
    /// Backend name used in logs
    fn name(&self) -> &str;

    /// Insert or replace a record
    async fn put(&self, collection: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Insert or replace several records in one collection atomically
    async fn put_batch(&self, collection: &str, entries: Vec<(String, Vec<u8>)>) -> StorageResult<()>;

    /// Fetch a record, `None` when absent
    async fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Delete a record; returns whether it existed
    async fn delete(&self, collection: &str, key: &str) -> StorageResult<bool>;

    /// All records in a collection, ordered by key
    async fn list(&self, collection: &str) -> StorageResult<Vec<(String, Vec<u8>)>>;

    /// Number of records in a collection
    async fn count(&self, collection: &str) -> StorageResult<usize> {
        Ok(self.list(collection).await?.len())
    }
}

/// Reject empty names and names that would escape a collection
pub(crate) fn check_name(kind: &str, name: &str) -> StorageResult<()> {
    if name.is_empty() {
        return Err(StorageError::InvalidKey(format!("{} must not be empty", kind)));
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(StorageError::InvalidKey(format!(
            "{} '{}' contains a forbidden character",
            kind, name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_name() {
        assert!(check_name("key", "backup-1").is_ok());
        assert!(check_name("key", "").is_err());
        assert!(check_name("key", "../etc").is_err());
    }
}
