//! HTTP Interface
//!
//! A thin JSON mapping of the store operations, served with axum.
//!
//! ## Routes
//!
//! | Method/Path         | Operation                        |
//! |---------------------|----------------------------------|
//! | `GET /health`       | liveness                         |
//! | `GET /stats`        | counters of every open store     |
//! | `GET /scan?prefix=` | [`Store::scan`]                  |
//! | `POST /kv`          | [`Store::batch_put`]             |
//! | `GET /kv/<key>`     | [`Store::get`]                   |
//! | `PUT /kv/<key>`     | [`Store::put`]                   |
//! | `DELETE /kv/<key>`  | [`Store::delete`]                |
//!
//! The `x-store` header selects the store instance; requests without it
//! go to [`DEFAULT_STORE`]. Only writes open a store that is not open yet;
//! reads and deletes against an unknown store see it as empty. Keys may
//! contain `/`.

mod error;
mod handlers;
pub mod types;

pub use error::AppError;

use crate::storage::{Store, StoreRegistry, DEFAULT_STORE};
use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Header naming the store a request targets.
pub const STORE_HEADER: &str = "x-store";

/// Shared state of the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<StoreRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self { registry }
    }
}

fn store_name(parts: &Parts) -> Result<&str, AppError> {
    match parts.headers.get(STORE_HEADER) {
        Some(value) => value
            .to_str()
            .map_err(|_| AppError::BadRequest("invalid store name".to_string())),
        None => Ok(DEFAULT_STORE),
    }
}

/// The store selected by the request's `x-store` header, opened on demand.
///
/// Used by routes that write.
pub struct Instance(pub Store);

impl FromRequestParts<AppState> for Instance {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let name = store_name(parts)?;
        Ok(Instance(state.registry.store(name).await?))
    }
}

/// The store selected by the request's `x-store` header, if it is open.
///
/// Used by routes that only read or remove, so they never create a store.
pub struct OpenInstance(pub Option<Store>);

impl FromRequestParts<AppState> for OpenInstance {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let name = store_name(parts)?;
        Ok(OpenInstance(state.registry.lookup(name).await?))
    }
}

/// The `{*key}` path segment. Keys that are not UTF-8 once decoded are
/// rejected through the JSON error envelope.
pub struct KeyPath(pub String);

impl<S: Send + Sync> FromRequestParts<S> for KeyPath {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(key) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::BadRequest("invalid key".to_string()))?;
        Ok(KeyPath(key))
    }
}

/// Builds the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/scan", get(handlers::scan))
        .route(
            "/kv",
            post(handlers::batch_put)
                .get(handlers::missing_key)
                .put(handlers::missing_key)
                .delete(handlers::missing_key),
        )
        .route(
            "/kv/",
            get(handlers::missing_key)
                .put(handlers::missing_key)
                .delete(handlers::missing_key),
        )
        .route(
            "/kv/{*key}",
            get(handlers::get_value)
                .put(handlers::put_value)
                .delete(handlers::delete_value),
        )
        .fallback(handlers::no_route)
        .with_state(state)
}

/// Serves the router on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP interface listening");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
