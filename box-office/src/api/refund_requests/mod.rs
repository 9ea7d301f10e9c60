//! Refund Requests API 模块 - 批量退款的申请与执行

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/refund-requests", post(handler::create))
        .route("/api/refund-requests/{id}", get(handler::get))
        .route("/api/refund-requests/{id}/approve", post(handler::approve))
        .route("/api/refund-requests/{id}/reject", post(handler::reject))
        .route("/api/refund-requests/{id}/process", post(handler::process))
        .route(
            "/api/events/{event_id}/refund-requests",
            get(handler::list_for_event),
        )
}
