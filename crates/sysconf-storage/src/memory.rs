//! In-memory storage backend

use std::collections::BTreeMap;

use tokio::sync::RwLock;

use crate::error::StorageResult;
use crate::traits::{check_name, Storage};

type Collections = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// Storage backed by nested ordered maps
///
/// Contents live exactly as long as the value; dropping it is the teardown.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    collections: RwLock<Collections>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, collection: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        check_name("collection", collection)?;
        check_name("key", key)?;
        let mut guard = self.collections.write().await;
        guard
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn put_batch(&self, collection: &str, entries: Vec<(String, Vec<u8>)>) -> StorageResult<()> {
        check_name("collection", collection)?;
        for (key, _) in &entries {
            check_name("key", key)?;
        }
        let mut guard = self.collections.write().await;
        let tree = guard.entry(collection.to_string()).or_default();
        for (key, value) in entries {
            tree.insert(key, value);
        }
        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let guard = self.collections.read().await;
        Ok(guard.get(collection).and_then(|c| c.get(key)).cloned())
    }

    async fn delete(&self, collection: &str, key: &str) -> StorageResult<bool> {
        let mut guard = self.collections.write().await;
        Ok(guard
            .get_mut(collection)
            .map(|c| c.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn list(&self, collection: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let storage = MemoryStorage::new();
        storage.put("versions", "v1", b"one".to_vec()).await.unwrap();

        assert_eq!(
            storage.get("versions", "v1").await.unwrap(),
            Some(b"one".to_vec())
        );
        assert!(storage.delete("versions", "v1").await.unwrap());
        assert!(!storage.delete("versions", "v1").await.unwrap());
        assert!(storage.get("versions", "v1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let storage = MemoryStorage::new();
        storage.put("a", "k", b"1".to_vec()).await.unwrap();
        storage.put("b", "k", b"2".to_vec()).await.unwrap();

        assert_eq!(storage.count("a").await.unwrap(), 1);
        assert_eq!(storage.get("b", "k").await.unwrap(), Some(b"2".to_vec()));
        assert!(storage.list("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_batch_and_list_order() {
        let storage = MemoryStorage::new();
        storage
            .put_batch(
                "versions",
                vec![
                    ("b".to_string(), b"2".to_vec()),
                    ("a".to_string(), b"1".to_vec()),
                ],
            )
            .await
            .unwrap();

        let keys: Vec<String> = storage
            .list("versions")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let storage = MemoryStorage::new();
        assert!(storage.put("versions", "", vec![]).await.is_err());
    }
}
