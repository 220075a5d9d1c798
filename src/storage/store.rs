//! Store: one serialized key-value instance with TTL support.
//!
//! A [`Store`] owns its backend key space, a mutex that serializes every
//! operation against it (client calls and alarm firings alike), and the
//! single alarm that drives active expiry. Different stores share nothing.
//!
//! ## Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: `get` and `scan` check the expiration of every record they
//!    read and delete the expired ones before answering.
//! 2. **Active**: the alarm fires at the earliest pending expiration and
//!    deletes everything that is due, whether or not anybody reads it.
//!
//! Every mutation ends with [`rearm`](Store::rearm), the one place that
//! decides when the alarm fires next.

use super::backend::Backend;
use super::clock::{Clock, EpochMillis};
use super::codec::{StoredRecord, TtlOption};
use super::error::{StoreError, StoreResult};
use super::marker::{self, Marker};
use super::reaper::{self, AlarmSchedule, MIN_ALARM_DELAY_MS};
use super::txn::Transaction;
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One item of a [`Store::batch_put`].
#[derive(Debug, Clone, PartialEq)]
pub struct PutItem {
    pub key: String,
    pub value: Value,
    pub ttl: TtlOption,
}

impl PutItem {
    pub fn new(key: impl Into<String>, value: Value, ttl: TtlOption) -> Self {
        Self {
            key: key.into(),
            value,
            ttl,
        }
    }
}

/// One live entry returned by [`Store::scan`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanItem {
    pub key: String,
    pub value: Value,
}

/// Operation counters of a store.
#[derive(Debug, Default)]
struct Counters {
    gets: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
    batch_items: AtomicU64,
    scans: AtomicU64,
    lazy_reaped: AtomicU64,
    active_reaped: AtomicU64,
    alarms_fired: AtomicU64,
}

/// Store statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Total `get` calls
    pub gets: u64,
    /// Total `put` calls
    pub puts: u64,
    /// Total `delete` calls
    pub deletes: u64,
    /// Items written through `batch_put`
    pub batch_items: u64,
    /// Total `scan` calls
    pub scans: u64,
    /// Expired keys removed by `get` or `scan`
    pub lazy_reaped: u64,
    /// Expired keys removed by the alarm
    pub active_reaped: u64,
    /// Alarm firings (including the recovery pass on open)
    pub alarms_fired: u64,
    /// Next scheduled wake-up, in epoch milliseconds
    pub next_alarm: Option<EpochMillis>,
}

struct StoreInner {
    name: String,
    backend: Arc<dyn Backend>,
    clock: Arc<dyn Clock>,
    /// Serializes every operation on this store.
    lock: Mutex<()>,
    schedule: AlarmSchedule,
    alarm_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    counters: Counters,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Some(task) = self.alarm_task.get_mut().take() {
            task.abort();
        }
    }
}

/// A named key-value store instance.
///
/// `Store` is `Clone`; clones share the same instance.
///
/// # Example
///
/// ```ignore
/// use tidekv::storage::{MemoryBackend, Store, SystemClock, TtlOption};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let store = Store::open("default", Arc::new(MemoryBackend::new()), Arc::new(SystemClock)).await?;
///
/// store.put("session", json!({"user": 7}), TtlOption::seconds(60.0)).await?;
/// assert_eq!(store.get("session").await?, Some(json!({"user": 7})));
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .field("next_alarm", &self.inner.schedule.deadline())
            .finish()
    }
}

/// A reference to a store that does not keep it alive.
#[derive(Clone)]
pub(crate) struct WeakStore(Weak<StoreInner>);

impl WeakStore {
    pub(crate) fn upgrade(&self) -> Option<Store> {
        self.0.upgrade().map(|inner| Store { inner })
    }
}

impl Store {
    /// Opens a store over `backend` and starts its alarm.
    ///
    /// Anything that expired while the store was closed is reaped before
    /// this returns, and the alarm is armed for the next pending expiration.
    pub async fn open(
        name: impl Into<String>,
        backend: Arc<dyn Backend>,
        clock: Arc<dyn Clock>,
    ) -> StoreResult<Self> {
        let (schedule, rx) = AlarmSchedule::new();
        let store = Store {
            inner: Arc::new(StoreInner {
                name: name.into(),
                backend,
                clock,
                lock: Mutex::new(()),
                schedule,
                alarm_task: parking_lot::Mutex::new(None),
                counters: Counters::default(),
            }),
        };

        let task = reaper::spawn(store.downgrade(), rx);
        *store.inner.alarm_task.lock() = Some(task);

        let reaped = store.on_alarm().await?;
        info!(
            store = %store.name(),
            reaped,
            next_alarm = ?store.next_alarm(),
            "Store opened"
        );

        Ok(store)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn now_ms(&self) -> EpochMillis {
        self.inner.clock.now_ms()
    }

    fn backend(&self) -> &dyn Backend {
        self.inner.backend.as_ref()
    }

    fn downgrade(&self) -> WeakStore {
        WeakStore(Arc::downgrade(&self.inner))
    }

    /// Detaches the alarm task handle, leaving the task running.
    #[cfg(test)]
    pub(crate) fn take_alarm_task(&self) -> Option<JoinHandle<()>> {
        self.inner.alarm_task.lock().take()
    }

    /// Reads a value.
    ///
    /// Returns `None` if the key is absent or expired. An expired record is
    /// deleted together with its marker before returning.
    pub async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let _guard = self.inner.lock.lock().await;
        self.inner.counters.gets.fetch_add(1, Ordering::Relaxed);

        let now = self.now_ms();
        let mut txn = Transaction::new(self.backend());

        let Some(record) = txn.read_record(key).await? else {
            return Ok(None);
        };

        if !record.is_expired(now) {
            return Ok(Some(record.into_value()));
        }

        stage_reap(&mut txn, key, &record);
        txn.commit().await?;
        self.inner.counters.lazy_reaped.fetch_add(1, Ordering::Relaxed);
        debug!(store = %self.name(), key = %key, "Lazily reaped expired key");

        self.rearm_after_commit().await;
        Ok(None)
    }

    /// Stores a value, replacing any previous value and TTL of `key`.
    ///
    /// Returns the resulting expiration, or `None` for a permanent value.
    pub async fn put(
        &self,
        key: &str,
        value: Value,
        ttl: TtlOption,
    ) -> StoreResult<Option<EpochMillis>> {
        let _guard = self.inner.lock.lock().await;
        self.inner.counters.puts.fetch_add(1, Ordering::Relaxed);

        let now = self.now_ms();
        let expires_at = ttl.resolve(now);

        let mut txn = Transaction::new(self.backend());
        stage_put(&mut txn, key, value, expires_at, now).await?;
        txn.commit().await?;

        self.rearm_after_commit().await;
        Ok(expires_at)
    }

    /// Removes a key and its marker. Deleting an absent key is a no-op.
    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        let _guard = self.inner.lock.lock().await;
        self.inner.counters.deletes.fetch_add(1, Ordering::Relaxed);

        let mut txn = Transaction::new(self.backend());
        marker::remove_old_marker(&mut txn, key).await?;
        txn.delete(marker::data_key(key));
        txn.commit().await?;

        self.rearm_after_commit().await;
        Ok(())
    }

    /// Writes every item in one atomic transaction.
    ///
    /// Either all values and markers become visible or none do. Items are
    /// applied in order, so a key repeated in the batch ends up with its
    /// last value and a single marker. The alarm is re-armed once, after
    /// the commit.
    pub async fn batch_put(&self, items: Vec<PutItem>) -> StoreResult<usize> {
        let _guard = self.inner.lock.lock().await;

        let now = self.now_ms();
        let count = items.len();
        let mut txn = Transaction::new(self.backend());

        for item in items {
            let expires_at = item.ttl.resolve(now);
            stage_put(&mut txn, &item.key, item.value, expires_at, now).await?;
        }
        txn.commit().await?;

        self.inner
            .counters
            .batch_items
            .fetch_add(count as u64, Ordering::Relaxed);
        debug!(store = %self.name(), count, "Batch committed");

        self.rearm_after_commit().await;
        Ok(count)
    }

    /// Lists every live entry whose key starts with `prefix`, ordered by key.
    ///
    /// Expired entries met along the way are deleted and left out.
    /// Entries that cannot be decoded are skipped.
    pub async fn scan(&self, prefix: &str) -> StoreResult<Vec<ScanItem>> {
        let _guard = self.inner.lock.lock().await;
        self.inner.counters.scans.fetch_add(1, Ordering::Relaxed);

        let now = self.now_ms();
        let entries = self
            .backend()
            .list_prefix(&marker::data_prefix(prefix))
            .await?;

        let mut txn = Transaction::new(self.backend());
        let mut items = Vec::with_capacity(entries.len());
        let mut reaped = 0u64;

        for (raw_key, raw_value) in entries {
            let Some(key) = marker::decode_data_key(&raw_key) else {
                continue;
            };
            let record = match StoredRecord::decode(&raw_value) {
                Ok(record) => record,
                Err(e) => {
                    warn!(store = %self.name(), key = %key, error = %e, "Skipping undecodable record");
                    continue;
                }
            };

            if record.is_expired(now) {
                stage_reap(&mut txn, &key, &record);
                reaped += 1;
            } else {
                items.push(ScanItem {
                    key,
                    value: record.into_value(),
                });
            }
        }

        if !txn.is_empty() {
            txn.commit().await?;
            self.inner
                .counters
                .lazy_reaped
                .fetch_add(reaped, Ordering::Relaxed);
            debug!(store = %self.name(), reaped, "Scan reaped expired keys");
            self.rearm_after_commit().await;
        }

        Ok(items)
    }

    /// Alarm handler: deletes every entry whose expiration has passed,
    /// then re-arms for the next one.
    ///
    /// Returns the number of keys reaped.
    pub async fn on_alarm(&self) -> StoreResult<usize> {
        let _guard = self.inner.lock.lock().await;
        self.inner.counters.alarms_fired.fetch_add(1, Ordering::Relaxed);

        let now = self.now_ms();
        let due = marker::due_markers(self.backend(), now).await?;

        let mut txn = Transaction::new(self.backend());
        let mut reaped = 0usize;

        for Marker { expires_at, key } in &due {
            txn.delete(marker::marker_key_for(*expires_at, key));

            // Only remove the record this marker was written for
            match txn.read_record(key).await {
                Ok(Some(record)) if record.expires_at() == Some(*expires_at) => {
                    txn.delete(marker::data_key(key));
                    reaped += 1;
                }
                Ok(_) => {}
                Err(StoreError::CorruptRecord { .. }) => {
                    txn.delete(marker::data_key(key));
                    reaped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        txn.commit().await?;
        self.inner
            .counters
            .active_reaped
            .fetch_add(reaped as u64, Ordering::Relaxed);
        if reaped > 0 {
            debug!(store = %self.name(), reaped, "Alarm reaped expired keys");
        }

        self.rearm().await?;
        Ok(reaped)
    }

    /// Recomputes the alarm from the marker index.
    ///
    /// Schedules the wake-up at the earliest expiration strictly after now
    /// (never sooner than [`MIN_ALARM_DELAY_MS`] from now), or disarms when
    /// no such marker exists. Callers must hold the store lock.
    async fn rearm(&self) -> StoreResult<Option<EpochMillis>> {
        let now = self.now_ms();
        let next = marker::next_pending(self.backend(), now)
            .await?
            .map(|m| m.expires_at.max(now.saturating_add(MIN_ALARM_DELAY_MS)));

        if self.inner.schedule.set(next) {
            debug!(store = %self.name(), next_alarm = ?next, "Alarm re-armed");
        }
        Ok(next)
    }

    /// Re-arms after a committed change.
    ///
    /// The change is already durable, so a failure here is logged instead of
    /// failing the operation. The schedule catches up on the next rearm.
    async fn rearm_after_commit(&self) {
        if let Err(e) = self.rearm().await {
            warn!(store = %self.name(), error = %e, "Failed to re-arm alarm");
        }
    }

    /// The scheduled wake-up, if any.
    pub fn next_alarm(&self) -> Option<EpochMillis> {
        self.inner.schedule.deadline()
    }

    /// Every marker currently in the index, in expiration order.
    pub async fn pending_markers(&self) -> StoreResult<Vec<Marker>> {
        let _guard = self.inner.lock.lock().await;
        marker::list_pending_markers(self.backend()).await
    }

    /// Returns a snapshot of the store's counters.
    pub fn stats(&self) -> StoreStats {
        let c = &self.inner.counters;
        StoreStats {
            gets: c.gets.load(Ordering::Relaxed),
            puts: c.puts.load(Ordering::Relaxed),
            deletes: c.deletes.load(Ordering::Relaxed),
            batch_items: c.batch_items.load(Ordering::Relaxed),
            scans: c.scans.load(Ordering::Relaxed),
            lazy_reaped: c.lazy_reaped.load(Ordering::Relaxed),
            active_reaped: c.active_reaped.load(Ordering::Relaxed),
            alarms_fired: c.alarms_fired.load(Ordering::Relaxed),
            next_alarm: self.next_alarm(),
        }
    }
}

/// Stages the write of `value` under `key`, replacing its old marker.
///
/// A value whose expiration has already passed is never readable, so it
/// is not written at all: the key is simply cleared.
async fn stage_put(
    txn: &mut Transaction<'_>,
    key: &str,
    value: Value,
    expires_at: Option<EpochMillis>,
    now: EpochMillis,
) -> StoreResult<()> {
    marker::remove_old_marker(txn, key).await?;

    if expires_at.is_some_and(|at| at <= now) {
        txn.delete(marker::data_key(key));
        return Ok(());
    }

    txn.put_record(key, &StoredRecord::wrap(value, expires_at))?;
    if let Some(at) = expires_at {
        txn.put(marker::marker_key_for(at, key), Bytes::new());
    }
    Ok(())
}

/// Stages the removal of an expired record and its marker.
fn stage_reap(txn: &mut Transaction<'_>, key: &str, record: &StoredRecord) {
    if let Some(at) = record.expires_at() {
        txn.delete(marker::marker_key_for(at, key));
    }
    txn.delete(marker::data_key(key));
}
