//! Reaper: the per-store expiration alarm.
//!
//! Lazy expiry (checking on read) is enough for correctness, but a key that
//! expires and is never read again would stay in storage forever. The
//! reaper bounds that leak: every store owns exactly one alarm, armed for
//! the earliest pending expiration, which deletes everything that is due
//! and re-arms itself.
//!
//! ## Design
//!
//! ```text
//!   put / delete / get / scan / on_alarm
//!                  │
//!                  ▼
//!             Store::rearm ──── min pending expires_at ────┐
//!                                                         │ watch channel
//!                                                         ▼
//!                                       ┌───────────────────────────────┐
//!                                       │ alarm task (one per store)    │
//!                                       │  sleep until the deadline,    │
//!                                       │  or wake early when re-armed  │
//!                                       └──────────────┬────────────────┘
//!                                                      │ deadline reached
//!                                                      ▼
//!                                               Store::on_alarm
//! ```
//!
//! The schedule is a `watch` channel holding `Option<deadline>`, so arming
//! always supersedes the previous deadline and there is never more than one
//! outstanding. The task holds only a weak reference to its store and exits
//! when the store is dropped.

use super::clock::EpochMillis;
use super::store::WeakStore;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// A wake-up is never scheduled sooner than this after "now".
pub const MIN_ALARM_DELAY_MS: u64 = 1;

/// Pause before retrying an alarm whose reap failed.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// The single scheduling slot of a store.
#[derive(Debug)]
pub(crate) struct AlarmSchedule {
    tx: watch::Sender<Option<EpochMillis>>,
}

impl AlarmSchedule {
    pub(crate) fn new() -> (Self, watch::Receiver<Option<EpochMillis>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }

    /// Replaces the scheduled deadline. `None` disarms.
    ///
    /// Returns `true` if the schedule changed.
    pub(crate) fn set(&self, deadline: Option<EpochMillis>) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == deadline {
                false
            } else {
                *current = deadline;
                true
            }
        })
    }

    /// The currently scheduled deadline.
    pub(crate) fn deadline(&self) -> Option<EpochMillis> {
        *self.tx.borrow()
    }
}

/// Starts the alarm task of a store.
pub(crate) fn spawn(
    store: WeakStore,
    rx: watch::Receiver<Option<EpochMillis>>,
) -> JoinHandle<()> {
    tokio::spawn(alarm_loop(store, rx))
}

async fn alarm_loop(store: WeakStore, mut rx: watch::Receiver<Option<EpochMillis>>) {
    loop {
        let deadline = *rx.borrow_and_update();

        let Some(at) = deadline else {
            // Disarmed: wait for the next schedule, or for the store to go away
            if rx.changed().await.is_err() {
                break;
            }
            continue;
        };

        let delay = match store.upgrade() {
            Some(store) => at.saturating_sub(store.now_ms()),
            None => break,
        };

        let fire = tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(delay)) => true,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                // Superseded. A deadline that already passed still has to fire.
                match store.upgrade() {
                    Some(store) => store.now_ms() >= at,
                    None => break,
                }
            }
        };

        if !fire {
            continue;
        }

        let Some(store) = store.upgrade() else {
            break;
        };

        trace!(store = %store.name(), deadline = at, "Alarm fired");
        if let Err(e) = store.on_alarm().await {
            warn!(store = %store.name(), error = %e, "Alarm reap failed, retrying");
            drop(store);
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }

    debug!("Alarm task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ManualClock, Marker, MemoryBackend, Store, SystemClock, TtlOption};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_schedule_is_a_single_slot() {
        let (schedule, rx) = AlarmSchedule::new();
        assert_eq!(schedule.deadline(), None);

        assert!(schedule.set(Some(10)));
        assert!(schedule.set(Some(5)));
        assert_eq!(schedule.deadline(), Some(5));
        assert_eq!(*rx.borrow(), Some(5));

        // Same value is not a change
        assert!(!schedule.set(Some(5)));

        assert!(schedule.set(None));
        assert_eq!(schedule.deadline(), None);
    }

    #[tokio::test]
    async fn test_alarm_reaps_unread_keys() {
        let store = Store::open("reaper", Arc::new(MemoryBackend::new()), Arc::new(SystemClock))
            .await
            .unwrap();

        for i in 0..10 {
            store
                .put(&format!("key{i}"), json!(i), TtlOption::seconds(0.05))
                .await
                .unwrap();
        }
        store.put("persistent", json!("value"), TtlOption::none()).await.unwrap();
        assert!(store.next_alarm().is_some());

        // Nobody reads the TTL'd keys; the alarm must remove them
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(store.pending_markers().await.unwrap(), vec![]);
        assert_eq!(store.next_alarm(), None);
        assert_eq!(store.stats().active_reaped, 10);

        let keys: Vec<String> = store.scan("").await.unwrap().into_iter().map(|i| i.key).collect();
        assert_eq!(keys, vec!["persistent".to_string()]);
    }

    #[tokio::test]
    async fn test_alarm_rearms_for_next_expiration() {
        let store = Store::open("rearm", Arc::new(MemoryBackend::new()), Arc::new(SystemClock))
            .await
            .unwrap();

        store.put("soon", json!(1), TtlOption::seconds(0.05)).await.unwrap();
        let later = store
            .put("later", json!(2), TtlOption::seconds(60.0))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(store.next_alarm(), later);
        assert_eq!(store.get("later").await.unwrap(), Some(json!(2)));
        assert_eq!(store.stats().active_reaped, 1);
    }

    #[tokio::test]
    async fn test_passed_deadline_fires_when_superseded() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = Store::open("superseded", Arc::new(MemoryBackend::new()), clock.clone())
            .await
            .unwrap();

        store.put("short", json!(1), TtlOption::seconds(5.0)).await.unwrap();
        assert_eq!(store.next_alarm(), Some(1_005_000));

        // Let the alarm task park on the short deadline
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The short deadline passes, then a later one replaces it before the
        // task's real-time sleep runs out
        clock.advance(10_000);
        let long = store
            .put("long", json!(2), TtlOption::seconds(600.0))
            .await
            .unwrap();
        assert_eq!(long, Some(1_610_000));

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.stats().active_reaped, 1);
        assert_eq!(store.pending_markers().await.unwrap(), vec![Marker::new(1_610_000, "long")]);
        assert_eq!(store.next_alarm(), long);
        assert_eq!(store.get("long").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_alarm_task_stops_with_store() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = Store::open("drop", Arc::new(MemoryBackend::new()), clock)
            .await
            .unwrap();
        store.put("k", json!(1), TtlOption::seconds(3600.0)).await.unwrap();

        let handle = store.take_alarm_task().unwrap();
        drop(store);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("alarm task should exit once the store is dropped")
            .unwrap();
    }
}
