//! Storage Module
//!
//! This module provides the core of tidekv: named key-value stores with
//! per-key TTL, a marker index of pending expirations, and one alarm per
//! store that reaps expired keys nobody reads again.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       StoreRegistry                          │
//! │   "default"            "sessions"             "cache"        │
//! │  ┌────────────┐      ┌────────────┐       ┌────────────┐     │
//! │  │   Store    │      │   Store    │       │   Store    │     │
//! │  │  Mutex     │      │  Mutex     │       │  Mutex     │     │
//! │  │  Alarm     │      │  Alarm     │       │  Alarm     │     │
//! │  └─────┬──────┘      └─────┬──────┘       └─────┬──────┘     │
//! └────────┼───────────────────┼────────────────────┼────────────┘
//!          ▼                   ▼                    ▼
//!   ┌────────────────────────────────────────────────────────┐
//!   │  Backend (MemoryBackend | RedbBackend)                 │
//!   │   'd' + key               → StoredRecord (JSON)        │
//!   │   'm' + expires_at + key  → marker (empty)             │
//!   └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use tidekv::storage::{MemoryBackend, Store, SystemClock, TtlOption};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let store = Store::open("default", Arc::new(MemoryBackend::new()), Arc::new(SystemClock)).await?;
//!
//! store.put("name", json!("Ada"), TtlOption::none()).await?;
//! store.put("session", json!({"token": "abc"}), TtlOption::seconds(3600.0)).await?;
//!
//! assert_eq!(store.get("name").await?, Some(json!("Ada")));
//! ```

pub mod backend;
pub mod clock;
pub mod codec;
pub mod error;
pub mod marker;
pub mod memory;
pub mod reaper;
pub mod redb;
pub mod registry;
pub mod store;
pub mod txn;

// Re-export commonly used types
pub use backend::{Backend, Mutation};
pub use clock::{Clock, EpochMillis, ManualClock, SystemClock};
pub use codec::{StoredRecord, TtlOption};
pub use error::{BackendError, StoreError, StoreResult};
pub use marker::Marker;
pub use memory::MemoryBackend;
pub use self::redb::{RedbBackend, RedbDatabase};
pub use registry::{StorageMode, StoreRegistry, DEFAULT_MAX_STORES, DEFAULT_STORE};
pub use store::{PutItem, ScanItem, Store, StoreStats};
