//! Tickets API 模块 - 扫码核销、状态查询、QR 校验

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/tickets/scan", post(handler::scan))
        .route("/api/tickets/by-code/{code}", get(handler::status_by_code))
        .route("/api/tickets/verify-qr", post(handler::verify_qr))
}
