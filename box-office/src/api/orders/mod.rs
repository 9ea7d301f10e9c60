//! Orders API 模块 - 结账、支付确认、取消、查询

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/orders/checkout", post(handler::checkout))
        .route("/api/orders/{id}", get(handler::get_order))
        .route(
            "/api/orders/by-number/{number}",
            get(handler::get_order_by_number),
        )
        .route(
            "/api/orders/{id}/confirm-payment",
            post(handler::confirm_payment),
        )
        .route("/api/orders/{id}/cancel", post(handler::cancel_order))
        .route("/api/orders/{id}/tickets", get(handler::order_tickets))
        .route("/api/events/{event_id}/orders", get(handler::list_orders))
}
