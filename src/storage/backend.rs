//! Backend trait for the persistent key space.
//!
//! A backend is an ordered byte-key → byte-value map. The store layers its
//! data namespace and marker index on top of it, so backends know nothing
//! about TTLs.

use super::error::BackendError;
use async_trait::async_trait;
use bytes::Bytes;

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Put(Bytes, Bytes),
    Delete(Bytes),
}

/// Ordered, durable key-value storage.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
/// Keys compare as raw bytes.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Reads a single entry.
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>, BackendError>;

    /// Returns entries whose key starts with `prefix` and is `>= from`,
    /// in ascending key order, at most `limit` of them.
    async fn seek(
        &self,
        prefix: &[u8],
        from: &[u8],
        limit: Option<usize>,
    ) -> Result<Vec<(Bytes, Bytes)>, BackendError>;

    /// Applies every mutation or none of them.
    ///
    /// Mutations are applied in order, so a later write to the same key wins.
    async fn apply(&self, batch: Vec<Mutation>) -> Result<(), BackendError>;

    /// Every entry whose key starts with `prefix`, in ascending key order.
    async fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<(Bytes, Bytes)>, BackendError> {
        self.seek(prefix, prefix, None).await
    }

    /// Writes a single entry.
    async fn put(&self, key: Bytes, value: Bytes) -> Result<(), BackendError> {
        self.apply(vec![Mutation::Put(key, value)]).await
    }

    /// Removes a single entry. Removing an absent key is not an error.
    async fn delete(&self, key: Bytes) -> Result<(), BackendError> {
        self.apply(vec![Mutation::Delete(key)]).await
    }
}
