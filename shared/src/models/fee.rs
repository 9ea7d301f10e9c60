//! Fee Rule Model

use serde::{Deserialize, Serialize};

/// How the fee amount is computed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeCalculation {
    /// `base * amount / 100`
    Percentage,
    /// Flat amount per order.
    Fixed,
    /// `amount * ticket_count`
    PerTicket,
}

/// 费用规则 - 独立的平台/服务费配置
///
/// 百分比费用以折后小计为基数。
///
/// 隐藏费用 (`display_to_customer = false`) 仍计入总费用，
/// 但不出现在面向顾客的明细里。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fee {
    pub id: String,
    pub name: String,
    pub calculation_type: FeeCalculation,
    /// Percentage (0-100) or currency amount, per `calculation_type`.
    pub amount: f64,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Evaluation and presentation order.
    #[serde(default)]
    pub display_order: i32,
    #[serde(default = "default_true")]
    pub display_to_customer: bool,
    #[serde(default)]
    pub created_at: i64,
}

fn default_true() -> bool {
    true
}
