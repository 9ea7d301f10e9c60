//! Tickets API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use shared::models::Ticket;

use crate::core::ServerState;
use crate::tickets::ScanOutcome;
use crate::utils::AppResult;

#[derive(Deserialize, Validate)]
pub struct ScanRequest {
    #[validate(length(min = 1))]
    pub code: String,
    #[validate(length(min = 1))]
    pub scanned_by: String,
    pub location: Option<String>,
}

/// POST /api/tickets/scan - 核销入场
///
/// 并发扫同一张票时只有一个请求拿到 ACCEPTED，其余返回首扫的
/// 审计信息 (ALREADY_USED)。
pub async fn scan(
    State(state): State<ServerState>,
    Json(payload): Json<ScanRequest>,
) -> AppResult<Json<ScanOutcome>> {
    payload.validate()?;
    let outcome = state
        .tickets
        .scan(&payload.code, &payload.scanned_by, payload.location.as_deref())
        .await?;
    Ok(Json(outcome))
}

/// GET /api/tickets/by-code/:code - 只读状态查询，绝不改票
pub async fn status_by_code(
    State(state): State<ServerState>,
    Path(code): Path<String>,
) -> AppResult<Json<Ticket>> {
    Ok(Json(state.tickets.status_by_code(&code)?))
}

#[derive(Deserialize, Validate)]
pub struct VerifyQrRequest {
    #[validate(length(min = 1))]
    pub payload: String,
}

#[derive(Serialize)]
pub struct VerifyQrResponse {
    pub valid: bool,
}

/// POST /api/tickets/verify-qr - 离线签名校验，不触存储
pub async fn verify_qr(
    State(state): State<ServerState>,
    Json(payload): Json<VerifyQrRequest>,
) -> AppResult<Json<VerifyQrResponse>> {
    payload.validate()?;
    Ok(Json(VerifyQrResponse {
        valid: state.tickets.verify_qr(&payload.payload),
    }))
}
