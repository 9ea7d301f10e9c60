//! Promo Code Model

use serde::{Deserialize, Serialize};

/// Discount type enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromoDiscountType {
    Percentage,
    Fixed,
}

/// 优惠码 - 按活动配置，结账时校验并计算折扣
///
/// `current_uses` 单调递增：每个成功支付且使用了该码的订单恰好计一次，
/// 幂等性由服务端按 orderId 记录的消费记录保证。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromoCode {
    pub id: String,
    pub event_id: String,
    /// Code as entered by the organizer; matching is case-insensitive.
    pub code: String,
    pub discount_type: PromoDiscountType,
    /// Percentage (0-100) or fixed currency amount, per `discount_type`.
    pub discount_amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<i64>,
    /// Total usage cap (None = unlimited)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<u32>,
    /// Per-user usage cap (None = unlimited)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_uses_per_user: Option<u32>,
    #[serde(default)]
    pub current_uses: u32,
    /// Applicable ticket-type ids; empty = applies to all.
    #[serde(default)]
    pub applicable_ticket_types: Vec<String>,
    /// Minimum ticket count across applicable types.
    #[serde(default)]
    pub min_tickets: u32,
    /// Minimum purchase amount (subtotal) before the code applies.
    #[serde(default)]
    pub min_purchase_amount: f64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub created_at: i64,
}

fn default_true() -> bool {
    true
}

impl PromoCode {
    /// Normalized form used for unique lookup.
    pub fn normalized_code(&self) -> String {
        normalize_code(&self.code)
    }
}

/// Case-insensitive normal form of a promo code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}
