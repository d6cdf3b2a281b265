//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use store::Store;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub cache: CacheHealth,
}

#[derive(Serialize)]
pub struct CacheHealth {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// GET /health: liveness plus cache effectiveness since startup.
pub async fn check<S: Store + Clone>(State(state): State<Arc<AppState<S>>>) -> Json<HealthResponse> {
    let stats = state.service.cache().stats();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        cache: CacheHealth {
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
        },
    })
}
