//! Catalog API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use validator::Validate;

use shared::models::{
    EventSettings, Fee, FeeCalculation, PromoCode, PromoDiscountType, TicketType,
    promo_code::normalize_code,
};
use shared::util::{now_millis, record_id};

use crate::core::ServerState;
use crate::db::{EVENT_SETTINGS, FEES, PROMO_CODES, PROMO_CODE_IDX, TICKET_TYPES};
use crate::inventory::Availability;
use crate::utils::{AppError, AppResult};

// ========== Ticket Types ==========

#[derive(Deserialize, Validate)]
pub struct TicketTypeCreate {
    #[validate(length(min = 1))]
    pub event_id: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(range(min = 0.0))]
    pub price: f64,
    #[validate(range(min = 1))]
    pub capacity: u32,
    #[serde(default = "default_min_per_order")]
    pub min_per_order: u32,
    pub max_per_order: Option<u32>,
    pub sales_start: Option<i64>,
    pub sales_end: Option<i64>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

fn default_min_per_order() -> u32 {
    1
}

/// POST /api/ticket-types - 创建票种
pub async fn create_ticket_type(
    State(state): State<ServerState>,
    Json(payload): Json<TicketTypeCreate>,
) -> AppResult<Json<TicketType>> {
    payload.validate()?;
    if let Some(max) = payload.max_per_order
        && max < payload.min_per_order
    {
        return Err(AppError::validation(
            "max_per_order must be >= min_per_order",
        ));
    }

    let ticket_type = TicketType {
        id: record_id(),
        event_id: payload.event_id,
        name: payload.name,
        price: payload.price,
        capacity: payload.capacity,
        sold: 0,
        reserved: 0,
        min_per_order: payload.min_per_order,
        max_per_order: payload.max_per_order,
        sales_start: payload.sales_start,
        sales_end: payload.sales_end,
        active: payload.active,
        created_at: now_millis(),
    };
    state
        .store
        .insert_new(TICKET_TYPES, &ticket_type.id, &ticket_type)?;
    Ok(Json(ticket_type))
}

/// GET /api/ticket-types/:id
pub async fn get_ticket_type(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<TicketType>> {
    let ticket_type = state
        .store
        .get(TICKET_TYPES, &id)?
        .ok_or_else(|| AppError::not_found(format!("Ticket type {} not found", id)))?;
    Ok(Json(ticket_type))
}

/// GET /api/ticket-types/:id/availability - 计数器快照
pub async fn availability(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<Availability>> {
    Ok(Json(state.ledger.availability(&id)?))
}

/// GET /api/events/:event_id/ticket-types
pub async fn list_ticket_types(
    State(state): State<ServerState>,
    Path(event_id): Path<String>,
) -> AppResult<Json<Vec<TicketType>>> {
    let mut types: Vec<TicketType> = state
        .store
        .scan::<TicketType>(TICKET_TYPES)?
        .into_iter()
        .filter(|t| t.event_id == event_id)
        .collect();
    types.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(Json(types))
}

// ========== Fees ==========

#[derive(Deserialize, Validate)]
pub struct FeeCreate {
    #[validate(length(min = 1))]
    pub name: String,
    pub calculation_type: FeeCalculation,
    #[validate(range(min = 0.0))]
    pub amount: f64,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default = "default_true")]
    pub display_to_customer: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// POST /api/fees - 创建费用规则
pub async fn create_fee(
    State(state): State<ServerState>,
    Json(payload): Json<FeeCreate>,
) -> AppResult<Json<Fee>> {
    payload.validate()?;
    if payload.calculation_type == FeeCalculation::Percentage && payload.amount > 100.0 {
        return Err(AppError::validation(
            "Percentage fee amount must be between 0 and 100",
        ));
    }

    let fee = Fee {
        id: record_id(),
        name: payload.name,
        calculation_type: payload.calculation_type,
        amount: payload.amount,
        active: payload.active,
        display_order: payload.display_order,
        display_to_customer: payload.display_to_customer,
        created_at: now_millis(),
    };
    state.store.insert_new(FEES, &fee.id, &fee)?;
    Ok(Json(fee))
}

/// GET /api/fees - 全部费用规则，按展示顺序
pub async fn list_fees(State(state): State<ServerState>) -> AppResult<Json<Vec<Fee>>> {
    let mut fees: Vec<Fee> = state.store.scan(FEES)?;
    fees.sort_by(|a, b| a.display_order.cmp(&b.display_order));
    Ok(Json(fees))
}

// ========== Promo Codes ==========

#[derive(Deserialize, Validate)]
pub struct PromoCodeCreate {
    #[validate(length(min = 1))]
    pub event_id: String,
    #[validate(length(min = 1))]
    pub code: String,
    pub discount_type: PromoDiscountType,
    pub discount_amount: f64,
    pub valid_from: Option<i64>,
    pub valid_until: Option<i64>,
    pub max_uses: Option<u32>,
    pub max_uses_per_user: Option<u32>,
    #[serde(default)]
    pub applicable_ticket_types: Vec<String>,
    #[serde(default)]
    pub min_tickets: u32,
    #[serde(default)]
    pub min_purchase_amount: f64,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// POST /api/promo-codes - 创建优惠码
///
/// 折扣边界在写入前显式校验：百分比必须落在 [0, 100]。
pub async fn create_promo_code(
    State(state): State<ServerState>,
    Json(payload): Json<PromoCodeCreate>,
) -> AppResult<Json<PromoCode>> {
    payload.validate()?;
    match payload.discount_type {
        PromoDiscountType::Percentage => {
            if !(0.0..=100.0).contains(&payload.discount_amount) {
                return Err(AppError::validation(
                    "Percentage discount must be between 0 and 100",
                ));
            }
        }
        PromoDiscountType::Fixed => {
            if payload.discount_amount < 0.0 {
                return Err(AppError::validation("Fixed discount must be non-negative"));
            }
        }
    }

    let promo = PromoCode {
        id: record_id(),
        event_id: payload.event_id,
        code: payload.code.trim().to_string(),
        discount_type: payload.discount_type,
        discount_amount: payload.discount_amount,
        valid_from: payload.valid_from,
        valid_until: payload.valid_until,
        max_uses: payload.max_uses,
        max_uses_per_user: payload.max_uses_per_user,
        current_uses: 0,
        applicable_ticket_types: payload.applicable_ticket_types,
        min_tickets: payload.min_tickets,
        min_purchase_amount: payload.min_purchase_amount,
        active: payload.active,
        created_at: now_millis(),
    };

    // 码唯一（大小写不敏感）
    let inserted = state.store.insert_with_index(
        PROMO_CODES,
        &promo.id,
        &promo,
        PROMO_CODE_IDX,
        &normalize_code(&promo.code),
    )?;
    if !inserted {
        return Err(AppError::Conflict(format!(
            "Promo code {} already exists",
            promo.code
        )));
    }
    Ok(Json(promo))
}

/// GET /api/promo-codes/:id
pub async fn get_promo_code(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<PromoCode>> {
    let promo = state
        .store
        .get(PROMO_CODES, &id)?
        .ok_or_else(|| AppError::not_found(format!("Promo code {} not found", id)))?;
    Ok(Json(promo))
}

/// GET /api/events/:event_id/promo-codes
pub async fn list_promo_codes(
    State(state): State<ServerState>,
    Path(event_id): Path<String>,
) -> AppResult<Json<Vec<PromoCode>>> {
    let mut promos: Vec<PromoCode> = state
        .store
        .scan::<PromoCode>(PROMO_CODES)?
        .into_iter()
        .filter(|p| p.event_id == event_id)
        .collect();
    promos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(Json(promos))
}

// ========== Event Settings ==========

#[derive(Deserialize, Validate)]
pub struct EventSettingsUpdate {
    #[validate(length(min = 1))]
    pub organizer_id: String,
    #[validate(range(min = 0.0, max = 100.0))]
    #[serde(default)]
    pub tax_rate_percent: f64,
    #[serde(default)]
    pub tax_on_fees: bool,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "EUR".to_string()
}

/// PUT /api/events/:event_id/settings - 写入活动计费配置
pub async fn put_event_settings(
    State(state): State<ServerState>,
    Path(event_id): Path<String>,
    Json(payload): Json<EventSettingsUpdate>,
) -> AppResult<Json<EventSettings>> {
    payload.validate()?;
    let settings = EventSettings {
        event_id: event_id.clone(),
        organizer_id: payload.organizer_id,
        tax_rate_percent: payload.tax_rate_percent,
        tax_on_fees: payload.tax_on_fees,
        currency: payload.currency,
        created_at: now_millis(),
    };
    state.store.upsert(EVENT_SETTINGS, &event_id, &settings)?;
    Ok(Json(settings))
}

/// GET /api/events/:event_id/settings
pub async fn get_event_settings(
    State(state): State<ServerState>,
    Path(event_id): Path<String>,
) -> AppResult<Json<EventSettings>> {
    let settings = state
        .store
        .get(EVENT_SETTINGS, &event_id)?
        .ok_or_else(|| AppError::not_found(format!("No settings for event {}", event_id)))?;
    Ok(Json(settings))
}
