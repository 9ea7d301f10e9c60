//! Refund Requests API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use validator::Validate;

use shared::models::{RefundRequest, RefundType};

use crate::core::ServerState;
use crate::refunds::CreateRefund;
use crate::utils::AppResult;

#[derive(Deserialize, Validate)]
pub struct RefundCreateRequest {
    #[validate(length(min = 1))]
    pub event_id: String,
    pub refund_type: RefundType,
    /// `EVENT_CANCELLATION` 时可省略，表示该活动全部已支付订单
    #[serde(default)]
    pub order_ids: Vec<String>,
    pub reason: Option<String>,
}

/// POST /api/refund-requests - 创建退款申请 (快照总额)
pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<RefundCreateRequest>,
) -> AppResult<Json<RefundRequest>> {
    payload.validate()?;
    let request = state.refunds.create(CreateRefund {
        event_id: payload.event_id,
        refund_type: payload.refund_type,
        order_ids: payload.order_ids,
        reason: payload.reason,
    })?;
    Ok(Json(request))
}

/// GET /api/refund-requests/:id
pub async fn get(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<RefundRequest>> {
    Ok(Json(state.refunds.get(&id)?))
}

/// POST /api/refund-requests/:id/approve
pub async fn approve(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<RefundRequest>> {
    Ok(Json(state.refunds.approve(&id).await?))
}

/// POST /api/refund-requests/:id/reject
pub async fn reject(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<RefundRequest>> {
    Ok(Json(state.refunds.reject(&id).await?))
}

/// POST /api/refund-requests/:id/process - 逐单执行，单笔失败不拖垮整批
pub async fn process(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<RefundRequest>> {
    Ok(Json(state.refunds.process(&id).await?))
}

/// GET /api/events/:event_id/refund-requests
pub async fn list_for_event(
    State(state): State<ServerState>,
    Path(event_id): Path<String>,
) -> AppResult<Json<Vec<RefundRequest>>> {
    Ok(Json(state.refunds.list_for_event(&event_id)?))
}
