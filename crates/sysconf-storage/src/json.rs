//! JSON helpers over the byte-oriented [`Storage`] trait

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageResult;
use crate::traits::Storage;

/// Serialize `value` as JSON and store it
pub async fn put_json<T: Serialize>(
    storage: &dyn Storage,
    collection: &str,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let bytes = serde_json::to_vec(value)?;
    storage.put(collection, key, bytes).await
}

/// Fetch and decode a JSON record
pub async fn get_json<T: DeserializeOwned>(
    storage: &dyn Storage,
    collection: &str,
    key: &str,
) -> StorageResult<Option<T>> {
    match storage.get(collection, key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Decode every record in a collection, in key order
pub async fn list_json<T: DeserializeOwned>(
    storage: &dyn Storage,
    collection: &str,
) -> StorageResult<Vec<T>> {
    storage
        .list(collection)
        .await?
        .into_iter()
        .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(Into::into))
        .collect()
}
