//! # TideKV - A Key-Value Store with Per-Key Expiration
//!
//! TideKV stores JSON values under string keys. Any key can carry a
//! time-to-live; expired keys disappear from reads immediately and are
//! physically removed by a per-store alarm, even if nobody reads them again.
//!
//! ## Features
//!
//! - **Per-key TTL**: relative (`ttl` seconds) or absolute (`expiration` epoch seconds)
//! - **Lazy + Active Expiry**: reads never return expired data; an alarm reaps the rest
//! - **Atomic Batches**: a batch upsert lands completely or not at all
//! - **Pluggable Backends**: in-memory or durable on redb
//! - **JSON over HTTP**: a small axum service in front of the store
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                               TideKV                                 │
//! │                                                                      │
//! │  ┌─────────────┐    ┌──────────────┐    ┌──────────────────────────┐ │
//! │  │ axum Router │───>│ StoreRegistry│───>│ Store  (one per x-store) │ │
//! │  │  /kv /scan  │    │ name -> Store│    │  get/put/delete/batch/   │ │
//! │  └─────────────┘    └──────────────┘    │  scan under one mutex    │ │
//! │                                         └──────┬────────────▲──────┘ │
//! │                                                │            │        │
//! │                      ┌─────────────────────────┘            │        │
//! │                      ▼                                      │        │
//! │  ┌──────────────────────────────┐   ┌───────────────────────┴────┐   │
//! │  │ Backend (memory | redb)      │   │ Alarm task                 │   │
//! │  │  d<key>             -> record│   │  fires at earliest marker  │   │
//! │  │  m<expires_at><key> -> ()    │   │  runs Store::on_alarm      │   │
//! │  └──────────────────────────────┘   └────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use tidekv::storage::{StorageMode, StoreRegistry, SystemClock, TtlOption};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = StoreRegistry::new(StorageMode::Memory, Arc::new(SystemClock));
//!     let store = registry.store("default").await?;
//!
//!     store.put("session:1", json!({"user": 7}), TtlOption::seconds(30.0)).await?;
//!     assert!(store.get("session:1").await?.is_some());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: record codec, marker index, store operations and the reaper
//! - [`http`]: JSON routes over the store registry
//! - [`config`]: command line and environment configuration

pub mod config;
pub mod http;
pub mod storage;

pub use config::Config;
pub use http::{router, serve, AppState};
pub use storage::{
    StorageMode, Store, StoreError, StoreRegistry, StoreResult, SystemClock, TtlOption,
};

/// The default port TideKV listens on
pub const DEFAULT_PORT: u16 = 8787;

/// The default host TideKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of TideKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
