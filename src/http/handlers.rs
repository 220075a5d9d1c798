//! HTTP handlers.
//!
//! Each handler maps one route onto a store operation. Request bodies are
//! parsed leniently: anything that is not valid JSON is treated as `{}`.

use super::error::AppError;
use super::types::{
    BatchResponse, DeleteResponse, GetResponse, OkResponse, PutResponse, ScanQuery,
    ScanResponse, StatsResponse,
};
use super::{AppState, Instance, KeyPath, OpenInstance};
use crate::storage::{PutItem, TtlOption};
use axum::extract::{Query, State};
use axum::Json;
use bytes::Bytes;
use serde_json::{Map, Value};
use tracing::debug;

/// Parses a request body, falling back to an empty object.
fn lenient_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap_or_else(|_| Value::Object(Map::new()))
}

/// Splits a PUT body into the value to store and its TTL options.
///
/// `{"value": V, "ttl": ..}` stores `V`; any other body is itself the value.
fn split_put_body(body: Value) -> (Value, TtlOption) {
    let ttl = TtlOption::from_json(&body);
    let value = match body {
        Value::Object(mut map) if map.contains_key("value") => {
            map.remove("value").unwrap_or_default()
        }
        other => other,
    };
    (value, ttl)
}

/// Turns a batch body into put items, skipping entries without a string key.
fn batch_items(body: &Value) -> Vec<PutItem> {
    body.get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let key = item.get("key")?.as_str()?;
                    let value = item.get("value").cloned().unwrap_or_default();
                    Some(PutItem::new(key, value, TtlOption::from_json(item)))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// GET /health
pub(crate) async fn health() -> Json<OkResponse> {
    Json(OkResponse { ok: true })
}

/// GET /stats - Counters of every open store.
pub(crate) async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        version: crate::VERSION,
        stores: state.registry.stats().await,
    })
}

/// GET /scan?prefix=p - Live entries whose key starts with `p`.
pub(crate) async fn scan(
    OpenInstance(store): OpenInstance,
    Query(query): Query<ScanQuery>,
) -> Result<Json<ScanResponse>, AppError> {
    let prefix = query.prefix.unwrap_or_default();
    let items = match store {
        Some(store) => {
            let items = store.scan(&prefix).await?;
            debug!(store = %store.name(), prefix = %prefix, count = items.len(), "Scan");
            items
        }
        None => Vec::new(),
    };

    Ok(Json(ScanResponse {
        prefix,
        count: items.len(),
        items,
    }))
}

/// POST /kv - Atomic batch upsert.
pub(crate) async fn batch_put(
    Instance(store): Instance,
    body: Bytes,
) -> Result<Json<BatchResponse>, AppError> {
    let items = batch_items(&lenient_json(&body));
    let upserted = store.batch_put(items).await?;
    debug!(store = %store.name(), upserted, "Batch upsert");

    Ok(Json(BatchResponse { ok: true, upserted }))
}

/// GET /kv/:key
pub(crate) async fn get_value(
    KeyPath(key): KeyPath,
    OpenInstance(store): OpenInstance,
) -> Result<Json<GetResponse>, AppError> {
    let value = match store {
        Some(store) => store.get(&key).await?,
        None => None,
    };

    match value {
        Some(value) => Ok(Json(GetResponse { key, value })),
        None => Err(AppError::NotFound { key }),
    }
}

/// PUT /kv/:key - Store a value with optional `ttl` or `expiration`.
pub(crate) async fn put_value(
    KeyPath(key): KeyPath,
    Instance(store): Instance,
    body: Bytes,
) -> Result<Json<PutResponse>, AppError> {
    let (value, ttl) = split_put_body(lenient_json(&body));
    let expires_at = store.put(&key, value, ttl).await?;
    debug!(store = %store.name(), key = %key, expires_at = ?expires_at, "Put");

    Ok(Json(PutResponse {
        ok: true,
        key,
        expires_at,
    }))
}

/// DELETE /kv/:key
pub(crate) async fn delete_value(
    KeyPath(key): KeyPath,
    OpenInstance(store): OpenInstance,
) -> Result<Json<DeleteResponse>, AppError> {
    if let Some(store) = store {
        store.delete(&key).await?;
        debug!(store = %store.name(), key = %key, "Delete");
    }

    Ok(Json(DeleteResponse { ok: true, key }))
}

/// Any /kv route without a key segment.
pub(crate) async fn missing_key() -> AppError {
    AppError::BadRequest("missing key".to_string())
}

pub(crate) async fn no_route() -> AppError {
    AppError::NoRoute
}
