//! sled-backed persistent storage
//!
//! Each collection maps to a sled tree of the same name. Batches are applied
//! atomically with `Tree::apply_batch`, and every write is flushed before
//! the call returns.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::traits::{check_name, Storage};

/// Storage persisted in an embedded sled database
#[derive(Debug)]
pub struct SledStorage {
    path: PathBuf,
    db: sled::Db,
}

impl SledStorage {
    /// Open (or create) a database at `path`
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = sled::open(&path)?;
        debug!(path = %path.display(), "Opened sled storage");
        Ok(Self { path, db })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tree(&self, collection: &str) -> StorageResult<sled::Tree> {
        check_name("collection", collection)?;
        Ok(self.db.open_tree(collection)?)
    }
}

fn key_to_string(key: &sled::IVec) -> StorageResult<String> {
    String::from_utf8(key.to_vec())
        .map_err(|e| StorageError::InvalidKey(format!("non UTF-8 key: {}", e)))
}

#[async_trait::async_trait]
impl Storage for SledStorage {
    fn name(&self) -> &str {
        "sled"
    }

    async fn put(&self, collection: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        check_name("key", key)?;
        let tree = self.tree(collection)?;
        tree.insert(key.as_bytes(), value)?;
        tree.flush_async().await?;
        Ok(())
    }

    async fn put_batch(&self, collection: &str, entries: Vec<(String, Vec<u8>)>) -> StorageResult<()> {
        let tree = self.tree(collection)?;
        let mut batch = sled::Batch::default();
        for (key, value) in entries {
            check_name("key", &key)?;
            batch.insert(key.as_bytes(), value);
        }
        tree.apply_batch(batch)?;
        tree.flush_async().await?;
        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let tree = self.tree(collection)?;
        Ok(tree.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    async fn delete(&self, collection: &str, key: &str) -> StorageResult<bool> {
        let tree = self.tree(collection)?;
        let existed = tree.remove(key.as_bytes())?.is_some();
        tree.flush_async().await?;
        Ok(existed)
    }

    async fn list(&self, collection: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let tree = self.tree(collection)?;
        let mut out = Vec::new();
        for item in tree.iter() {
            let (key, value) = item?;
            out.push((key_to_string(&key)?, value.to_vec()));
        }
        Ok(out)
    }

    async fn count(&self, collection: &str) -> StorageResult<usize> {
        Ok(self.tree(collection)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store");

        {
            let storage = SledStorage::open(&path).unwrap();
            storage.put("backups", "b-1", b"payload".to_vec()).await.unwrap();
        }

        let storage = SledStorage::open(&path).unwrap();
        assert_eq!(
            storage.get("backups", "b-1").await.unwrap(),
            Some(b"payload".to_vec())
        );
    }

    #[tokio::test]
    async fn test_batch_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SledStorage::open(temp_dir.path().join("store")).unwrap();

        storage
            .put_batch(
                "versions",
                vec![
                    ("v1".to_string(), b"1".to_vec()),
                    ("v2".to_string(), b"2".to_vec()),
                ],
            )
            .await
            .unwrap();
        assert_eq!(storage.count("versions").await.unwrap(), 2);

        assert!(storage.delete("versions", "v1").await.unwrap());
        let listed = storage.list("versions").await.unwrap();
        assert_eq!(listed, vec![("v2".to_string(), b"2".to_vec())]);
    }
}
