//! Orders API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use shared::models::{Order, OrderStatus, Ticket};

use crate::core::ServerState;
use crate::orders::{CheckoutInput, CheckoutLine};
use crate::utils::{AppError, AppResult};

// ========== Checkout ==========

#[derive(Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1))]
    pub event_id: String,
    #[validate(length(min = 1))]
    pub items: Vec<CheckoutItem>,
    #[validate(length(min = 1))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: String,
    pub promo_code: Option<String>,
}

#[derive(Deserialize, Serialize)]
pub struct CheckoutItem {
    pub ticket_type_id: String,
    pub quantity: u32,
}

/// POST /api/orders/checkout - 预留库存并创建待支付订单
pub async fn checkout(
    State(state): State<ServerState>,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Json<Order>> {
    payload.validate()?;
    let input = CheckoutInput {
        event_id: payload.event_id,
        items: payload
            .items
            .into_iter()
            .map(|i| CheckoutLine {
                ticket_type_id: i.ticket_type_id,
                quantity: i.quantity,
            })
            .collect(),
        customer_name: payload.customer_name,
        customer_email: payload.customer_email,
        promo_code: payload.promo_code,
    };
    let order = state.orders.checkout(input).await?;
    Ok(Json(order))
}

// ========== Lifecycle ==========

#[derive(Deserialize, Validate)]
pub struct ConfirmPaymentRequest {
    #[validate(length(min = 1))]
    pub payment_reference: String,
}

/// POST /api/orders/:id/confirm-payment - 支付确认，幂等
pub async fn confirm_payment(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(payload): Json<ConfirmPaymentRequest>,
) -> AppResult<Json<Order>> {
    payload.validate()?;
    let order = state
        .orders
        .confirm_payment(&id, &payload.payment_reference)
        .await?;
    Ok(Json(order))
}

#[derive(Deserialize, Default)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

/// POST /api/orders/:id/cancel
pub async fn cancel_order(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    payload: Option<Json<CancelRequest>>,
) -> AppResult<Json<Order>> {
    let reason = payload.and_then(|Json(p)| p.reason);
    let order = state.orders.cancel(&id, reason.as_deref()).await?;
    Ok(Json(order))
}

// ========== Queries ==========

/// GET /api/orders/:id
pub async fn get_order(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<Order>> {
    Ok(Json(state.orders.get(&id)?))
}

/// GET /api/orders/by-number/:number
pub async fn get_order_by_number(
    State(state): State<ServerState>,
    Path(number): Path<String>,
) -> AppResult<Json<Order>> {
    Ok(Json(state.orders.get_by_number(&number)?))
}

/// GET /api/orders/:id/tickets
pub async fn order_tickets(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Ticket>>> {
    // 404 for unknown orders rather than an empty list
    state.orders.get(&id)?;
    Ok(Json(state.tickets.tickets_for_order(&id)?))
}

#[derive(Deserialize)]
pub struct OrderListQuery {
    pub status: Option<String>,
}

/// GET /api/events/:event_id/orders?status=PAID
pub async fn list_orders(
    State(state): State<ServerState>,
    Path(event_id): Path<String>,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<Vec<Order>>> {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(parse_status(raw)?),
    };
    Ok(Json(state.orders.list_for_event(&event_id, status)?))
}

fn parse_status(raw: &str) -> Result<OrderStatus, AppError> {
    serde_json::from_value(serde_json::Value::String(raw.to_uppercase()))
        .map_err(|_| AppError::validation(format!("Unknown order status: {}", raw)))
}
