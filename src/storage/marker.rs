//! Marker Index
//!
//! A secondary namespace holding one empty sentinel entry per live TTL'd
//! key. Pending expirations are found by walking this namespace instead of
//! scanning every value.
//!
//! ## Key Layout
//!
//! ```text
//! data entry:    'd' | utf8(key)
//! marker entry:  'm' | expires_at (u64, big-endian) | utf8(key)
//! ```
//!
//! The timestamp is fixed-width, so everything after byte 9 is the key and
//! decoding is unambiguous for any key content. Big-endian encoding makes
//! the backend's byte order equal to expiration order, so the earliest
//! pending marker after `now` is a single seek away.

use super::backend::Backend;
use super::clock::EpochMillis;
use super::codec::StoredRecord;
use super::error::{StoreError, StoreResult};
use super::txn::Transaction;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

/// Namespace prefix for data entries.
pub const DATA_PREFIX: &[u8] = b"d";

/// Namespace prefix for marker entries.
pub const MARKER_PREFIX: &[u8] = b"m";

const TIMESTAMP_LEN: usize = 8;

/// Markers fetched per page when seeking the next pending expiration.
const SEEK_PAGE: usize = 16;

/// Backend key of the data entry for `key`.
pub fn data_key(key: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(DATA_PREFIX.len() + key.len());
    buf.put_slice(DATA_PREFIX);
    buf.put_slice(key.as_bytes());
    buf.freeze()
}

/// Backend key prefix covering every data entry whose key starts with `prefix`.
pub fn data_prefix(prefix: &str) -> Bytes {
    data_key(prefix)
}

/// Recovers the caller key from a data entry's backend key.
pub fn decode_data_key(raw: &[u8]) -> Option<String> {
    let key = raw.strip_prefix(DATA_PREFIX)?;
    String::from_utf8(key.to_vec()).ok()
}

/// Marker identity: one pending expiration for one key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Marker {
    pub expires_at: EpochMillis,
    pub key: String,
}

impl Marker {
    pub fn new(expires_at: EpochMillis, key: impl Into<String>) -> Self {
        Self {
            expires_at,
            key: key.into(),
        }
    }

    /// Backend key of this marker.
    pub fn encode(&self) -> Bytes {
        marker_key_for(self.expires_at, &self.key)
    }

    /// Parses a marker entry's backend key. Returns `None` for anything
    /// that is not a well-formed marker.
    pub fn decode(raw: &[u8]) -> Option<Self> {
        let rest = raw.strip_prefix(MARKER_PREFIX)?;
        if rest.len() < TIMESTAMP_LEN {
            return None;
        }
        let (ts, key) = rest.split_at(TIMESTAMP_LEN);
        let expires_at = u64::from_be_bytes(ts.try_into().ok()?);
        let key = String::from_utf8(key.to_vec()).ok()?;
        Some(Self { expires_at, key })
    }
}

/// Backend key of the marker for `(expires_at, key)`.
pub fn marker_key_for(expires_at: EpochMillis, key: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(MARKER_PREFIX.len() + TIMESTAMP_LEN + key.len());
    buf.put_slice(MARKER_PREFIX);
    buf.put_u64(expires_at);
    buf.put_slice(key.as_bytes());
    buf.freeze()
}

/// Lowest marker key with an expiration of at least `expires_at`.
fn seek_key(expires_at: EpochMillis) -> Bytes {
    marker_key_for(expires_at, "")
}

/// Smallest key strictly greater than `raw`.
fn successor(raw: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(raw.len() + 1);
    buf.put_slice(raw);
    buf.put_u8(0);
    buf.freeze()
}

/// Deletes the marker of `key`'s current record, if that record is wrapped.
///
/// Must run before a new marker is staged for the same key so that a key
/// never owns two markers. Returns the record that was read.
///
/// An undecodable record has no marker this function can locate; it is
/// reported as absent so the caller can overwrite or delete it. Its marker,
/// if any, is dropped by the alarm once due.
pub async fn remove_old_marker(
    txn: &mut Transaction<'_>,
    key: &str,
) -> StoreResult<Option<StoredRecord>> {
    let record = match txn.read_record(key).await {
        Ok(record) => record,
        Err(StoreError::CorruptRecord { key, source }) => {
            warn!(key = %key, error = %source, "Replacing undecodable record");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    if let Some(expires_at) = record.as_ref().and_then(StoredRecord::expires_at) {
        txn.delete(marker_key_for(expires_at, key));
    }
    Ok(record)
}

/// Every well-formed marker, in expiration order. Malformed entries are skipped.
pub async fn list_pending_markers(backend: &dyn Backend) -> StoreResult<Vec<Marker>> {
    let entries = backend.list_prefix(MARKER_PREFIX).await?;
    Ok(entries
        .iter()
        .filter_map(|(raw, _)| Marker::decode(raw))
        .collect())
}

/// Markers with `expires_at <= now`, in expiration order.
pub async fn due_markers(backend: &dyn Backend, now: EpochMillis) -> StoreResult<Vec<Marker>> {
    let mut due = Vec::new();
    let mut from = seek_key(0);
    let end = seek_key(now.saturating_add(1));

    loop {
        let page = backend.seek(MARKER_PREFIX, &from, Some(SEEK_PAGE)).await?;
        for (raw, _) in &page {
            if raw.as_ref() >= end.as_ref() {
                return Ok(due);
            }
            if let Some(marker) = Marker::decode(raw) {
                due.push(marker);
            }
        }
        match page.last() {
            Some((last, _)) if page.len() == SEEK_PAGE => from = successor(last),
            _ => return Ok(due),
        }
    }
}

/// Earliest marker with `expires_at > now`.
pub async fn next_pending(
    backend: &dyn Backend,
    now: EpochMillis,
) -> StoreResult<Option<Marker>> {
    let mut from = seek_key(now.saturating_add(1));

    loop {
        let page = backend.seek(MARKER_PREFIX, &from, Some(SEEK_PAGE)).await?;
        if let Some(marker) = page.iter().find_map(|(raw, _)| Marker::decode(raw)) {
            return Ok(Some(marker));
        }
        match page.last() {
            Some((last, _)) if page.len() == SEEK_PAGE => from = successor(last),
            _ => return Ok(None),
        }
    }
}
