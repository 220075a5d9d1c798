//! Redb-backed persistent backend.
//!
//! One redb database file holds every store; each store name gets its own
//! table (`store:<name>`). Batches map onto a single redb write transaction,
//! so they are durable and atomic.

use super::backend::{Backend, Mutation};
use super::error::BackendError;
use async_trait::async_trait;
use bytes::Bytes;
use redb::{Database, ReadableDatabase, TableDefinition, TableError, TableHandle};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const TABLE_PREFIX: &str = "store:";

type RawTable<'a> = TableDefinition<'a, &'static [u8], &'static [u8]>;

/// An open redb database file shared by every store.
#[derive(Clone)]
pub struct RedbDatabase {
    db: Arc<Database>,
}

impl RedbDatabase {
    /// Opens or creates the database at `path`, creating parent
    /// directories as needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BackendError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path).map_err(redb::Error::from)?;
        debug!(path = %path.display(), "Opened redb database");

        Ok(Self { db: Arc::new(db) })
    }

    /// Names of every store that has a table in this database.
    pub fn store_names(&self) -> Result<Vec<String>, BackendError> {
        let names = || -> Result<Vec<String>, redb::Error> {
            let txn = self.db.begin_read()?;
            let names: Vec<String> = txn
                .list_tables()?
                .filter_map(|handle| {
                    handle
                        .name()
                        .strip_prefix(TABLE_PREFIX)
                        .map(str::to_string)
                })
                .collect();
            Ok(names)
        };
        Ok(names()?)
    }

    /// A backend bound to the table of store `name`.
    pub fn backend(&self, name: &str) -> RedbBackend {
        RedbBackend {
            db: Arc::clone(&self.db),
            table: Arc::from(format!("{TABLE_PREFIX}{name}")),
        }
    }
}

/// The key space of one store inside a [`RedbDatabase`].
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    table: Arc<str>,
}

impl RedbBackend {
    fn definition(&self) -> RawTable<'_> {
        TableDefinition::new(&self.table)
    }

    fn get_sync(&self, key: &[u8]) -> Result<Option<Bytes>, redb::Error> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(self.definition()) {
            Ok(table) => table,
            // Nothing written yet
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(table
            .get(key)?
            .map(|guard| Bytes::copy_from_slice(guard.value())))
    }

    fn seek_sync(
        &self,
        prefix: &[u8],
        from: &[u8],
        limit: Option<usize>,
    ) -> Result<Vec<(Bytes, Bytes)>, redb::Error> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(self.definition()) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let start = if from < prefix { prefix } else { from };
        let limit = limit.unwrap_or(usize::MAX);
        let mut entries = Vec::new();

        for item in table.range(start..)? {
            if entries.len() >= limit {
                break;
            }
            let (key, value) = item?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((
                Bytes::copy_from_slice(key),
                Bytes::copy_from_slice(value.value()),
            ));
        }

        Ok(entries)
    }

    fn apply_sync(&self, batch: &[Mutation]) -> Result<(), redb::Error> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(self.definition())?;
            for mutation in batch {
                match mutation {
                    Mutation::Put(key, value) => {
                        table.insert(key.as_ref(), value.as_ref())?;
                    }
                    Mutation::Delete(key) => {
                        table.remove(key.as_ref())?;
                    }
                }
            }
        }
        txn.commit()?;
        Ok(())
    }
}

#[async_trait]
impl Backend for RedbBackend {
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>, BackendError> {
        let backend = self.clone();
        let key = key.to_vec();
        Ok(tokio::task::spawn_blocking(move || backend.get_sync(&key)).await??)
    }

    async fn seek(
        &self,
        prefix: &[u8],
        from: &[u8],
        limit: Option<usize>,
    ) -> Result<Vec<(Bytes, Bytes)>, BackendError> {
        let backend = self.clone();
        let prefix = prefix.to_vec();
        let from = from.to_vec();
        Ok(tokio::task::spawn_blocking(move || backend.seek_sync(&prefix, &from, limit)).await??)
    }

    async fn apply(&self, batch: Vec<Mutation>) -> Result<(), BackendError> {
        if batch.is_empty() {
            return Ok(());
        }
        let backend = self.clone();
        Ok(tokio::task::spawn_blocking(move || backend.apply_sync(&batch)).await??)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[tokio::test]
    async fn test_reads_before_first_write() {
        let tmp = TempDir::new().unwrap();
        let db = RedbDatabase::open(tmp.path().join("kv.redb")).unwrap();
        let backend = db.backend("empty");

        assert_eq!(backend.get(b"missing").await.unwrap(), None);
        assert!(backend.list_prefix(b"").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_get_seek() {
        let tmp = TempDir::new().unwrap();
        let db = RedbDatabase::open(tmp.path().join("kv.redb")).unwrap();
        let backend = db.backend("main");

        backend
            .apply(vec![
                Mutation::Put(b("da"), b("1")),
                Mutation::Put(b("db"), b("2")),
                Mutation::Put(b("m1"), b("")),
            ])
            .await
            .unwrap();

        assert_eq!(backend.get(b"da").await.unwrap(), Some(b("1")));

        let data = backend.list_prefix(b"d").await.unwrap();
        assert_eq!(data, vec![(b("da"), b("1")), (b("db"), b("2"))]);

        let page = backend.seek(b"d", b"db", Some(5)).await.unwrap();
        assert_eq!(page, vec![(b("db"), b("2"))]);
    }

    #[tokio::test]
    async fn test_stores_are_isolated_and_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("kv.redb");

        {
            let db = RedbDatabase::open(&path).unwrap();
            db.backend("one").put(b("k"), b("1")).await.unwrap();
            db.backend("two").put(b("k"), b("2")).await.unwrap();
        }

        let db = RedbDatabase::open(&path).unwrap();
        let mut names = db.store_names().unwrap();
        names.sort();
        assert_eq!(names, vec!["one".to_string(), "two".to_string()]);

        assert_eq!(db.backend("one").get(b"k").await.unwrap(), Some(b("1")));
        assert_eq!(db.backend("two").get(b"k").await.unwrap(), Some(b("2")));
    }
}
