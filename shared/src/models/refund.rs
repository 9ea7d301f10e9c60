//! Refund Request Model

use serde::{Deserialize, Serialize};

/// Refund request type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundType {
    EventCancellation,
    BulkRefund,
    SingleOrder,
}

/// Refund request status
///
/// `PENDING -> {APPROVED, REJECTED}`; `APPROVED -> PROCESSED`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Processed,
}

impl RefundStatus {
    pub fn can_transition(self, next: RefundStatus) -> bool {
        use RefundStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Approved, Processed)
        )
    }
}

/// 退款请求 - 聚合一组订单的退款动作
///
/// 执行阶段对每个订单独立处理：单个订单失败不中断其余订单，
/// 失败明细记录在 `processing_errors` 中，请求保持 `PROCESSED`。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefundRequest {
    pub id: String,
    pub event_id: String,
    pub refund_type: RefundType,
    pub order_ids: Vec<String>,
    pub total_refund_amount: f64,
    pub status: RefundStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Populated only after execution.
    #[serde(default)]
    pub refunds_processed: u32,
    #[serde(default)]
    pub refunds_failed: u32,
    #[serde(default)]
    pub processing_errors: Vec<String>,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<i64>,
}
