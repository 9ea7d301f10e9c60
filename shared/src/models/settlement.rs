//! Settlement Request Model

use serde::{Deserialize, Serialize};

/// Settlement request status
///
/// `PENDING -> {APPROVED, REJECTED}`; `APPROVED -> PAID`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Paid,
}

impl SettlementStatus {
    pub fn can_transition(self, next: SettlementStatus) -> bool {
        use SettlementStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Approved, Paid)
        )
    }
}

/// 结算请求 - 主办方提现记录
///
/// 金额在创建时从已支付订单聚合一次性算出
/// (`total_sales - platform_fees - processing_fees`)，之后不再重算。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettlementRequest {
    pub id: String,
    pub event_id: String,
    pub organizer_id: String,
    /// Snapshot payout amount, never recomputed after creation.
    pub amount: f64,
    pub total_sales: f64,
    pub platform_fees: f64,
    pub processing_fees: f64,
    pub status: SettlementStatus,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<i64>,
}
