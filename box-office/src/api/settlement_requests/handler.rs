//! Settlement Requests API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use validator::Validate;

use shared::models::SettlementRequest;

use crate::core::ServerState;
use crate::utils::AppResult;

#[derive(Deserialize, Validate)]
pub struct SettlementCreateRequest {
    #[validate(length(min = 1))]
    pub event_id: String,
    #[validate(length(min = 1))]
    pub organizer_id: String,
}

/// POST /api/settlement-requests - 创建结算申请 (金额为创建时快照)
pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<SettlementCreateRequest>,
) -> AppResult<Json<SettlementRequest>> {
    payload.validate()?;
    let request = state
        .settlements
        .create(&payload.event_id, &payload.organizer_id)?;
    Ok(Json(request))
}

/// GET /api/settlement-requests/:id
pub async fn get(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<SettlementRequest>> {
    Ok(Json(state.settlements.get(&id)?))
}

/// POST /api/settlement-requests/:id/approve
pub async fn approve(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<SettlementRequest>> {
    Ok(Json(state.settlements.approve(&id).await?))
}

/// POST /api/settlement-requests/:id/reject
pub async fn reject(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<SettlementRequest>> {
    Ok(Json(state.settlements.reject(&id).await?))
}

/// POST /api/settlement-requests/:id/mark-paid
pub async fn mark_paid(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<SettlementRequest>> {
    Ok(Json(state.settlements.mark_paid(&id).await?))
}

/// GET /api/events/:event_id/settlement-requests
pub async fn list_for_event(
    State(state): State<ServerState>,
    Path(event_id): Path<String>,
) -> AppResult<Json<Vec<SettlementRequest>>> {
    Ok(Json(state.settlements.list_for_event(&event_id)?))
}
