//! Order Model

use serde::{Deserialize, Serialize};

/// 订单状态
///
/// 状态机: `PENDING -> PAID -> {CANCELLED, REFUNDED}`，
/// `PENDING -> CANCELLED` (结账放弃/超时)。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Exhaustive transition table for the order state machine.
    pub fn can_transition(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Pending, Cancelled) | (Paid, Cancelled) | (Paid, Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }
}

/// One quantity of one ticket type within an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub ticket_type_id: String,
    /// Ticket-type name snapshot at purchase time.
    pub ticket_type_name: String,
    pub quantity: u32,
    pub unit_price: f64,
    /// Share of the order discount attributed to this line.
    #[serde(default)]
    pub discount: f64,
    /// `quantity * unit_price`
    pub subtotal: f64,
    /// `subtotal - discount`
    pub total: f64,
}

/// 订单上的费用行快照，只含对顾客展示的费用
///
/// 隐藏费用计入 [`Order::fees`] 与 [`Order::total`]，但不在此列出。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderFeeLine {
    pub fee_id: String,
    pub name: String,
    pub amount: f64,
}

/// 订单 - 一次购票的持久化结果，拥有其行项目；支付成功后拥有门票
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    /// Human-readable sequential number: `ORD-YYYY-NNNNNN`.
    pub order_number: String,
    pub event_id: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub subtotal: f64,
    #[serde(default)]
    pub discount: f64,
    #[serde(default)]
    pub fees: f64,
    /// Itemized customer-visible fees; hidden fees only appear in `fees`.
    #[serde(default)]
    pub fee_lines: Vec<OrderFeeLine>,
    #[serde(default)]
    pub tax: f64,
    /// `subtotal - discount + fees + tax`
    pub total: f64,
    pub currency: String,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_code_id: Option<String>,
    /// Promo code snapshot as entered (normalized).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,
    /// External payment reference, set on confirmation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    /// Recorded when a paid transition fails mid-flight (commit error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_note: Option<String>,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refunded_at: Option<i64>,
}

impl Order {
    /// Total number of admission units across all line items.
    pub fn ticket_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}
