//! Value Codec
//!
//! Wraps a caller value together with an optional absolute expiration and
//! turns the loosely-typed TTL fields of a request into that expiration.
//!
//! ## Record Format
//!
//! Records are persisted as externally tagged JSON:
//!
//! ```text
//! {"bare": <value>}
//! {"wrapped": {"value": <value>, "expires_at": 1767225600000}}
//! ```
//!
//! The tag keeps a caller value that happens to look like a wrapped record
//! from ever being read back as one.

use super::clock::EpochMillis;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a caller asked for in terms of expiry.
///
/// Both fields are optional and permissive: anything that is not a finite
/// positive number is ignored rather than rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TtlOption {
    /// Relative lifetime in seconds, measured from the moment of the write.
    pub ttl_seconds: Option<f64>,
    /// Absolute expiration as seconds since the Unix epoch.
    pub expiration_epoch_seconds: Option<f64>,
}

impl TtlOption {
    /// No expiry: the value lives until it is overwritten or deleted.
    pub fn none() -> Self {
        Self::default()
    }

    /// Expire `secs` seconds after the write.
    pub fn seconds(secs: f64) -> Self {
        Self {
            ttl_seconds: Some(secs),
            ..Self::default()
        }
    }

    /// Expire at an absolute epoch second.
    pub fn at_epoch_seconds(secs: f64) -> Self {
        Self {
            expiration_epoch_seconds: Some(secs),
            ..Self::default()
        }
    }

    /// Reads the `ttl` and `expiration` fields of a JSON request body.
    ///
    /// Numbers and numeric strings are accepted. Missing, malformed,
    /// non-finite, zero or negative fields are treated as absent.
    pub fn from_json(body: &Value) -> Self {
        Self {
            ttl_seconds: positive_number(body.get("ttl")),
            expiration_epoch_seconds: positive_number(body.get("expiration")),
        }
    }

    /// Computes the absolute expiration in epoch milliseconds.
    ///
    /// A valid relative `ttl` wins over an absolute `expiration`.
    /// Returns `None` when neither field is a valid positive number.
    pub fn resolve(&self, now: EpochMillis) -> Option<EpochMillis> {
        if let Some(ttl) = self.ttl_seconds.filter(|s| is_positive(*s)) {
            return Some(now.saturating_add(secs_to_millis(ttl)));
        }

        self.expiration_epoch_seconds
            .filter(|s| is_positive(*s))
            .map(secs_to_millis)
    }
}

#[inline]
fn is_positive(secs: f64) -> bool {
    secs.is_finite() && secs > 0.0
}

#[inline]
fn secs_to_millis(secs: f64) -> u64 {
    // `as` saturates on overflow
    (secs * 1000.0).round() as u64
}

fn positive_number(field: Option<&Value>) -> Option<f64> {
    let n = match field? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    is_positive(n).then_some(n)
}

/// A value as it sits in the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredRecord {
    /// A value without TTL. Lives forever and has no marker.
    Bare(Value),
    /// A value with an absolute expiration. Always paired with one marker.
    Wrapped {
        value: Value,
        expires_at: EpochMillis,
    },
}

impl StoredRecord {
    /// Wraps `value` when an expiration is set, otherwise stores it bare.
    pub fn wrap(value: Value, expires_at: Option<EpochMillis>) -> Self {
        match expires_at {
            Some(expires_at) => StoredRecord::Wrapped { value, expires_at },
            None => StoredRecord::Bare(value),
        }
    }

    /// The expiration of a wrapped record.
    pub fn expires_at(&self) -> Option<EpochMillis> {
        match self {
            StoredRecord::Bare(_) => None,
            StoredRecord::Wrapped { expires_at, .. } => Some(*expires_at),
        }
    }

    /// True iff the record is wrapped and `expires_at <= now`.
    #[inline]
    pub fn is_expired(&self, now: EpochMillis) -> bool {
        self.expires_at().is_some_and(|exp| exp <= now)
    }

    /// Unwraps the caller value.
    pub fn into_value(self) -> Value {
        match self {
            StoredRecord::Bare(value) => value,
            StoredRecord::Wrapped { value, .. } => value,
        }
    }

    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    pub fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}
