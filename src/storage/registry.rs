//! Store registry: named store instances over one storage mode.
//!
//! Stores are opened lazily on first use and then kept for the life of the
//! registry. With a durable backend, [`StoreRegistry::open_existing`]
//! reopens every persisted store at startup so their alarms are armed
//! again even if no client touches them.

use super::backend::Backend;
use super::clock::Clock;
use super::error::{StoreError, StoreResult};
use super::memory::MemoryBackend;
use super::redb::RedbDatabase;
use super::store::{Store, StoreStats};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Name of the store used when a request does not pick one.
pub const DEFAULT_STORE: &str = "default";

/// Longest accepted store name.
pub const MAX_NAME_LEN: usize = 64;

/// Default cap on the number of open stores.
pub const DEFAULT_MAX_STORES: usize = 1024;

/// Where stores keep their data.
#[derive(Clone)]
pub enum StorageMode {
    /// Every store gets its own in-memory backend.
    Memory,
    /// Every store gets a table in one redb database.
    Redb(RedbDatabase),
}

impl StorageMode {
    fn backend(&self, name: &str) -> Arc<dyn Backend> {
        match self {
            StorageMode::Memory => Arc::new(MemoryBackend::new()),
            StorageMode::Redb(db) => Arc::new(db.backend(name)),
        }
    }
}

/// Checks that `name` is 1 to 64 characters of `[A-Za-z0-9_.-]`.
pub fn validate_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'));

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

/// Named stores sharing one storage mode and clock.
///
/// Every open store keeps an alarm task alive, so the number of stores
/// opened on demand is capped (see [`StoreRegistry::with_max_stores`]).
pub struct StoreRegistry {
    mode: StorageMode,
    clock: Arc<dyn Clock>,
    max_stores: usize,
    stores: Mutex<HashMap<String, Store>>,
}

impl StoreRegistry {
    pub fn new(mode: StorageMode, clock: Arc<dyn Clock>) -> Self {
        Self {
            mode,
            clock,
            max_stores: DEFAULT_MAX_STORES,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Sets how many stores [`store`](Self::store) may open.
    pub fn with_max_stores(mut self, max_stores: usize) -> Self {
        self.max_stores = max_stores;
        self
    }

    /// Opens every store persisted by the backend. Returns how many were opened.
    ///
    /// Persisted stores are reopened even beyond the cap so their pending
    /// expirations keep being reaped.
    pub async fn open_existing(&self) -> StoreResult<usize> {
        let names = match &self.mode {
            StorageMode::Memory => return Ok(0),
            StorageMode::Redb(db) => db.store_names()?,
        };

        let mut stores = self.stores.lock().await;
        let mut opened = 0;
        for name in names.iter().filter(|n| validate_name(n).is_ok()) {
            if stores.contains_key(name.as_str()) {
                continue;
            }
            let store = self.open(name).await?;
            stores.insert(name.clone(), store);
            opened += 1;
        }

        if stores.len() > self.max_stores {
            warn!(
                stores = stores.len(),
                max_stores = self.max_stores,
                "More persisted stores than the configured limit"
            );
        }
        info!(stores = opened, "Reopened persisted stores");
        Ok(opened)
    }

    /// Returns the store called `name`, opening it if needed.
    ///
    /// Fails with [`StoreError::TooManyStores`] when `name` is not open yet
    /// and the limit is reached.
    pub async fn store(&self, name: &str) -> StoreResult<Store> {
        validate_name(name)?;

        let mut stores = self.stores.lock().await;
        if let Some(store) = stores.get(name) {
            return Ok(store.clone());
        }
        if stores.len() >= self.max_stores {
            return Err(StoreError::TooManyStores(self.max_stores));
        }

        let store = self.open(name).await?;
        stores.insert(name.to_string(), store.clone());
        Ok(store)
    }

    /// Returns the store called `name` only if it is already open.
    pub async fn lookup(&self, name: &str) -> StoreResult<Option<Store>> {
        validate_name(name)?;
        Ok(self.stores.lock().await.get(name).cloned())
    }

    async fn open(&self, name: &str) -> StoreResult<Store> {
        Store::open(name, self.mode.backend(name), Arc::clone(&self.clock)).await
    }

    /// Number of open stores.
    pub async fn len(&self) -> usize {
        self.stores.lock().await.len()
    }

    /// Statistics of every open store, keyed by name.
    pub async fn stats(&self) -> BTreeMap<String, StoreStats> {
        self.stores
            .lock()
            .await
            .iter()
            .map(|(name, store)| (name.clone(), store.stats()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ManualClock, TtlOption};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("default").is_ok());
        assert!(validate_name("tenant-1.cache_v2").is_ok());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN)).is_ok());

        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("white space").is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[tokio::test]
    async fn test_same_name_same_store() {
        let registry = StoreRegistry::new(StorageMode::Memory, Arc::new(ManualClock::new(0)));

        let a = registry.store("a").await.unwrap();
        a.put("k", json!(1), TtlOption::none()).await.unwrap();

        let again = registry.store("a").await.unwrap();
        assert_eq!(again.get("k").await.unwrap(), Some(json!(1)));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_stores_are_isolated() {
        let registry = StoreRegistry::new(StorageMode::Memory, Arc::new(ManualClock::new(0)));

        let a = registry.store("a").await.unwrap();
        let b = registry.store("b").await.unwrap();
        a.put("k", json!("in a"), TtlOption::seconds(5.0)).await.unwrap();

        assert_eq!(b.get("k").await.unwrap(), None);
        assert_eq!(b.next_alarm(), None);
        assert_eq!(a.next_alarm(), Some(5_000));
    }

    #[tokio::test]
    async fn test_lookup_does_not_open() {
        let registry = StoreRegistry::new(StorageMode::Memory, Arc::new(ManualClock::new(0)));

        assert!(registry.lookup("ghost").await.unwrap().is_none());
        assert_eq!(registry.len().await, 0);

        registry.store("ghost").await.unwrap();
        assert!(registry.lookup("ghost").await.unwrap().is_some());

        let err = registry.lookup("bad name").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidName(_)));
    }

    #[tokio::test]
    async fn test_store_limit() {
        let registry = StoreRegistry::new(StorageMode::Memory, Arc::new(ManualClock::new(0)))
            .with_max_stores(2);

        registry.store("a").await.unwrap();
        registry.store("b").await.unwrap();
        let err = registry.store("c").await.unwrap_err();
        assert!(matches!(err, StoreError::TooManyStores(2)));

        // Already open stores stay reachable at the limit
        assert!(registry.store("a").await.is_ok());
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_open_existing_rearms_persisted_stores() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kv.redb");
        let clock = Arc::new(ManualClock::new(1_000_000));

        {
            let db = RedbDatabase::open(&path).unwrap();
            let registry = StoreRegistry::new(StorageMode::Redb(db), clock.clone());
            let store = registry.store("sessions").await.unwrap();
            store.put("expired", json!(1), TtlOption::seconds(1.0)).await.unwrap();
            store.put("live", json!(2), TtlOption::seconds(100.0)).await.unwrap();
            store.put("forever", json!(3), TtlOption::none()).await.unwrap();
        }

        clock.advance(5_000);

        let db = RedbDatabase::open(&path).unwrap();
        let registry = StoreRegistry::new(StorageMode::Redb(db), clock.clone());
        assert_eq!(registry.open_existing().await.unwrap(), 1);

        let stats = registry.stats().await;
        let sessions = stats["sessions"];
        assert_eq!(sessions.active_reaped, 1);
        assert_eq!(sessions.next_alarm, Some(1_100_000));

        let store = registry.store("sessions").await.unwrap();
        assert_eq!(store.get("expired").await.unwrap(), None);
        assert_eq!(store.get("live").await.unwrap(), Some(json!(2)));
        assert_eq!(store.get("forever").await.unwrap(), Some(json!(3)));
    }
}
