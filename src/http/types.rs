//! Request and response bodies of the HTTP interface.

use crate::storage::{EpochMillis, ScanItem, StoreStats};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    pub prefix: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub prefix: String,
    pub count: usize,
    pub items: Vec<ScanItem>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub ok: bool,
    pub upserted: usize,
}

#[derive(Debug, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct PutResponse {
    pub ok: bool,
    pub key: String,
    #[serde(rename = "expiresAt", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<EpochMillis>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub ok: bool,
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub version: &'static str,
    pub stores: BTreeMap<String, StoreStats>,
}
