//! Staged writes committed as one atomic backend batch.
//!
//! Reads inside a transaction see the transaction's own staged writes
//! first, then the backend. Nothing reaches the backend until
//! [`Transaction::commit`]; dropping a transaction discards it.

use super::backend::{Backend, Mutation};
use super::codec::StoredRecord;
use super::error::{StoreError, StoreResult};
use super::marker;
use bytes::Bytes;
use std::collections::HashMap;

pub struct Transaction<'a> {
    backend: &'a dyn Backend,
    /// Latest staged state per key; `None` marks a staged delete.
    staged: HashMap<Bytes, Option<Bytes>>,
    log: Vec<Mutation>,
}

impl<'a> Transaction<'a> {
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self {
            backend,
            staged: HashMap::new(),
            log: Vec::new(),
        }
    }

    /// Reads a raw entry, honoring staged writes.
    pub async fn get(&self, key: &[u8]) -> StoreResult<Option<Bytes>> {
        match self.staged.get(key) {
            Some(staged) => Ok(staged.clone()),
            None => Ok(self.backend.get(key).await?),
        }
    }

    /// Reads and decodes the data record of `key`.
    pub async fn read_record(&self, key: &str) -> StoreResult<Option<StoredRecord>> {
        let raw = self.get(&marker::data_key(key)).await?;
        raw.map(|raw| {
            StoredRecord::decode(&raw).map_err(|source| StoreError::CorruptRecord {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }

    pub fn put(&mut self, key: Bytes, value: Bytes) {
        self.staged.insert(key.clone(), Some(value.clone()));
        self.log.push(Mutation::Put(key, value));
    }

    pub fn delete(&mut self, key: Bytes) {
        self.staged.insert(key.clone(), None);
        self.log.push(Mutation::Delete(key));
    }

    /// Stages `record` as the data entry of `key`.
    pub fn put_record(&mut self, key: &str, record: &StoredRecord) -> StoreResult<()> {
        let raw = record.encode().map_err(StoreError::Encode)?;
        self.put(marker::data_key(key), raw);
        Ok(())
    }

    /// Number of staged mutations.
    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Applies every staged mutation atomically.
    pub async fn commit(self) -> StoreResult<()> {
        if self.log.is_empty() {
            return Ok(());
        }
        self.backend.apply(self.log).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryBackend;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[tokio::test]
    async fn test_reads_see_staged_writes() {
        let backend = MemoryBackend::new();
        backend.put(b("a"), b("old")).await.unwrap();

        let mut txn = Transaction::new(&backend);
        assert_eq!(txn.get(b"a").await.unwrap(), Some(b("old")));

        txn.put(b("a"), b("new"));
        assert_eq!(txn.get(b"a").await.unwrap(), Some(b("new")));

        txn.delete(b("a"));
        assert_eq!(txn.get(b"a").await.unwrap(), None);

        // Not yet visible
        assert_eq!(backend.get(b"a").await.unwrap(), Some(b("old")));

        txn.commit().await.unwrap();
        assert_eq!(backend.get(b"a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_dropped_transaction_writes_nothing() {
        let backend = MemoryBackend::new();
        {
            let mut txn = Transaction::new(&backend);
            txn.put(b("a"), b("1"));
            assert_eq!(txn.len(), 1);
        }
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_reported() {
        let backend = MemoryBackend::new();
        backend.put(marker::data_key("bad"), b("{not json")).await.unwrap();

        let txn = Transaction::new(&backend);
        let err = txn.read_record("bad").await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord { ref key, .. } if key == "bad"));
    }
}
