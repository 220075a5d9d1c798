//! In-memory backend.
//!
//! An ordered `BTreeMap` behind a single `RwLock`. Batches are applied
//! under one write lock, which makes them atomic. Nothing survives the
//! process; ideal for tests, development and caches.

use super::backend::{Backend, Mutation};
use super::error::BackendError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: RwLock<BTreeMap<Bytes, Bytes>>,
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of raw entries (data and markers).
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>, BackendError> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn seek(
        &self,
        prefix: &[u8],
        from: &[u8],
        limit: Option<usize>,
    ) -> Result<Vec<(Bytes, Bytes)>, BackendError> {
        let start = if from < prefix { prefix } else { from };
        let data = self.data.read();

        let entries = data
            .range::<[u8], _>((Bound::Included(start), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(limit.unwrap_or(usize::MAX))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(entries)
    }

    async fn apply(&self, batch: Vec<Mutation>) -> Result<(), BackendError> {
        let mut data = self.data.write();
        for mutation in batch {
            match mutation {
                Mutation::Put(key, value) => {
                    data.insert(key, value);
                }
                Mutation::Delete(key) => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let backend = MemoryBackend::new();

        backend.put(b("key"), b("value")).await.unwrap();
        assert_eq!(backend.get(b"key").await.unwrap(), Some(b("value")));

        backend.delete(b("key")).await.unwrap();
        assert_eq!(backend.get(b"key").await.unwrap(), None);

        // Idempotent
        backend.delete(b("key")).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_prefix_is_ordered_and_bounded() {
        let backend = MemoryBackend::new();
        backend
            .apply(vec![
                Mutation::Put(b("a/2"), b("2")),
                Mutation::Put(b("b/1"), b("3")),
                Mutation::Put(b("a/1"), b("1")),
                Mutation::Put(b("a"), b("0")),
            ])
            .await
            .unwrap();

        let keys: Vec<Bytes> = backend
            .list_prefix(b"a/")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b("a/1"), b("a/2")]);
    }

    #[tokio::test]
    async fn test_seek_with_limit() {
        let backend = MemoryBackend::new();
        let batch = (0..10)
            .map(|i| Mutation::Put(b(&format!("k{i}")), b("v")))
            .collect();
        backend.apply(batch).await.unwrap();

        let page = backend.seek(b"k", b"k4", Some(3)).await.unwrap();
        let keys: Vec<Bytes> = page.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b("k4"), b("k5"), b("k6")]);
    }

    #[tokio::test]
    async fn test_apply_in_order() {
        let backend = MemoryBackend::new();
        backend
            .apply(vec![
                Mutation::Put(b("k"), b("first")),
                Mutation::Delete(b("k")),
                Mutation::Put(b("k"), b("last")),
            ])
            .await
            .unwrap();

        assert_eq!(backend.get(b"k").await.unwrap(), Some(b("last")));
        assert_eq!(backend.len(), 1);
    }
}
