//! Settlement Requests API 模块 - 主办方结算

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/settlement-requests", post(handler::create))
        .route("/api/settlement-requests/{id}", get(handler::get))
        .route(
            "/api/settlement-requests/{id}/approve",
            post(handler::approve),
        )
        .route(
            "/api/settlement-requests/{id}/reject",
            post(handler::reject),
        )
        .route(
            "/api/settlement-requests/{id}/mark-paid",
            post(handler::mark_paid),
        )
        .route(
            "/api/events/{event_id}/settlement-requests",
            get(handler::list_for_event),
        )
}
