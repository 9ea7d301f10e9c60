//! Catalog API 模块 - 票种、费用规则、优惠码、活动计费配置

mod handler;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/ticket-types", post(handler::create_ticket_type))
        .route("/api/ticket-types/{id}", get(handler::get_ticket_type))
        .route(
            "/api/ticket-types/{id}/availability",
            get(handler::availability),
        )
        .route(
            "/api/events/{event_id}/ticket-types",
            get(handler::list_ticket_types),
        )
        .route("/api/fees", post(handler::create_fee).get(handler::list_fees))
        .route("/api/promo-codes", post(handler::create_promo_code))
        .route("/api/promo-codes/{id}", get(handler::get_promo_code))
        .route(
            "/api/events/{event_id}/promo-codes",
            get(handler::list_promo_codes),
        )
        .route(
            "/api/events/{event_id}/settings",
            put(handler::put_event_settings).get(handler::get_event_settings),
        )
}
