//! 结算流程
//!
//! 主办方提现请求。金额在创建时刻从该活动的已支付订单一次性聚合，
//! 之后不再重算——它是快照，不是实时视图：
//!
//! - `total_sales`: 已支付订单 `total` 之和
//! - `platform_fees`: 各订单费用之和（平台留存）
//! - `processing_fees`: 各订单税额之和（由平台代缴）
//! - `amount = total_sales - platform_fees - processing_fees`
//!
//! 即主办方实得净票款 `subtotal - discount` 之和。

use rust_decimal::Decimal;
use shared::models::{Order, OrderStatus, SettlementRequest, SettlementStatus};
use shared::util::{now_millis, record_id};
use thiserror::Error;

use crate::core::Config;
use crate::db::{RetryPolicy, SETTLEMENT_REQUESTS, Store, StorageError};
use crate::orders::{OrderError, OrderService};
use crate::pricing::{round2, to_decimal, to_f64};

/// 结算流程错误
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Settlement request not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Settlement request cannot transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: SettlementStatus,
        to: SettlementStatus,
    },

    #[error("Concurrent update conflict on settlement request {0}, retries exhausted")]
    Conflict(String),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<SettlementError> for crate::utils::AppError {
    fn from(e: SettlementError) -> Self {
        match e {
            SettlementError::NotFound(msg) => crate::utils::AppError::NotFound(msg),
            SettlementError::Validation(msg) => crate::utils::AppError::Validation(msg),
            SettlementError::InvalidTransition { .. } => {
                crate::utils::AppError::InvalidStateTransition(e.to_string())
            }
            SettlementError::Conflict(_) => {
                crate::utils::AppError::ConcurrencyConflict(e.to_string())
            }
            SettlementError::Order(inner) => inner.into(),
            SettlementError::Storage(inner) => inner.into(),
        }
    }
}

/// 结算服务
#[derive(Clone)]
pub struct SettlementService {
    store: Store,
    orders: OrderService,
    retry: RetryPolicy,
}

impl SettlementService {
    pub fn new(store: Store, orders: OrderService, config: &Config) -> Self {
        Self {
            store,
            orders,
            retry: RetryPolicy::from_config(config),
        }
    }

    /// 创建结算请求，聚合并快照金额
    pub fn create(
        &self,
        event_id: &str,
        organizer_id: &str,
    ) -> Result<SettlementRequest, SettlementError> {
        let paid: Vec<Order> = self
            .orders
            .list_for_event(event_id, Some(OrderStatus::Paid))?;
        if paid.is_empty() {
            return Err(SettlementError::Validation(format!(
                "No paid orders to settle for event {}",
                event_id
            )));
        }

        let total_sales: Decimal = paid.iter().map(|o| to_decimal(o.total)).sum();
        let platform_fees: Decimal = paid.iter().map(|o| to_decimal(o.fees)).sum();
        let processing_fees: Decimal = paid.iter().map(|o| to_decimal(o.tax)).sum();
        let amount = round2(total_sales - platform_fees - processing_fees);

        let request = SettlementRequest {
            id: record_id(),
            event_id: event_id.to_string(),
            organizer_id: organizer_id.to_string(),
            amount: to_f64(amount),
            total_sales: to_f64(round2(total_sales)),
            platform_fees: to_f64(round2(platform_fees)),
            processing_fees: to_f64(round2(processing_fees)),
            status: SettlementStatus::Pending,
            created_at: now_millis(),
            paid_at: None,
        };
        self.store
            .insert_new(SETTLEMENT_REQUESTS, &request.id, &request)?;

        tracing::info!(
            request_id = %request.id,
            event_id = %event_id,
            amount = request.amount,
            "Settlement request created"
        );
        Ok(request)
    }

    pub fn get(&self, request_id: &str) -> Result<SettlementRequest, SettlementError> {
        self.store
            .get(SETTLEMENT_REQUESTS, request_id)?
            .ok_or_else(|| SettlementError::NotFound(request_id.to_string()))
    }

    pub fn list_for_event(
        &self,
        event_id: &str,
    ) -> Result<Vec<SettlementRequest>, SettlementError> {
        let mut requests: Vec<SettlementRequest> = self
            .store
            .scan::<SettlementRequest>(SETTLEMENT_REQUESTS)?
            .into_iter()
            .filter(|r| r.event_id == event_id)
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    pub async fn approve(&self, request_id: &str) -> Result<SettlementRequest, SettlementError> {
        self.transition(request_id, SettlementStatus::Approved).await
    }

    pub async fn reject(&self, request_id: &str) -> Result<SettlementRequest, SettlementError> {
        self.transition(request_id, SettlementStatus::Rejected).await
    }

    /// 标记已打款
    pub async fn mark_paid(&self, request_id: &str) -> Result<SettlementRequest, SettlementError> {
        self.transition(request_id, SettlementStatus::Paid).await
    }

    async fn transition(
        &self,
        request_id: &str,
        target: SettlementStatus,
    ) -> Result<SettlementRequest, SettlementError> {
        let mut attempt = 0;
        loop {
            let (version, current) = self
                .store
                .get_versioned::<SettlementRequest>(SETTLEMENT_REQUESTS, request_id)?
                .ok_or_else(|| SettlementError::NotFound(request_id.to_string()))?;

            if !current.status.can_transition(target) {
                return Err(SettlementError::InvalidTransition {
                    from: current.status,
                    to: target,
                });
            }

            let mut updated = current;
            updated.status = target;
            if target == SettlementStatus::Paid {
                updated.paid_at = Some(now_millis());
            }

            if self
                .store
                .put_if_version(SETTLEMENT_REQUESTS, request_id, version, &updated)?
            {
                return Ok(updated);
            }

            attempt += 1;
            if attempt > self.retry.max_retries {
                return Err(SettlementError::Conflict(request_id.to_string()));
            }
            tokio::time::sleep(self.retry.delay(attempt)).await;
        }
    }
}
