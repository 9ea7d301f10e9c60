//! Health API Handlers

use axum::{Json, extract::State};
use serde::Serialize;

use crate::core::ServerState;
use crate::db::StorageStats;
use crate::utils::AppResult;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub environment: String,
    pub storage: StorageStats,
}

/// GET /api/health - 存活探针 + 存储统计
pub async fn health(State(state): State<ServerState>) -> AppResult<Json<HealthResponse>> {
    let storage = state.store.stats()?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
        storage,
    }))
}
