//! 退款流程
//!
//! 请求态: `PENDING -> {APPROVED, REJECTED}`，`APPROVED -> PROCESSED`。
//!
//! 执行是跨订单的尽力而为：每个订单独立处理，单个失败不回滚也不
//! 中断其余订单。`refunds_processed` / `refunds_failed` /
//! `processing_errors` 完整记录结果，请求最终停在 `PROCESSED`。
//!
//! 单个订单的退款：订单 `PAID -> REFUNDED`、名下门票转 `REFUNDED`、
//! 售出数退回可售、旁路通知顾客。

use std::sync::Arc;

use rust_decimal::Decimal;
use shared::models::{
    Order, OrderStatus, RefundRequest, RefundStatus, RefundType, TicketStatus,
};
use shared::util::{now_millis, record_id};
use thiserror::Error;

use crate::core::Config;
use crate::db::{REFUND_REQUESTS, RetryPolicy, Store, StorageError};
use crate::inventory::InventoryLedger;
use crate::orders::{OrderError, OrderService};
use crate::pricing::{round2, to_decimal, to_f64};
use crate::services::Notifier;
use crate::tickets::TicketService;

/// 退款流程错误 (请求级；订单级失败记入 processing_errors)
#[derive(Debug, Error)]
pub enum RefundError {
    #[error("Refund request not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Refund request cannot transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: RefundStatus,
        to: RefundStatus,
    },

    #[error("Concurrent update conflict on refund request {0}, retries exhausted")]
    Conflict(String),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<RefundError> for crate::utils::AppError {
    fn from(e: RefundError) -> Self {
        match e {
            RefundError::NotFound(msg) => crate::utils::AppError::NotFound(msg),
            RefundError::Validation(msg) => crate::utils::AppError::Validation(msg),
            RefundError::InvalidTransition { .. } => {
                crate::utils::AppError::InvalidStateTransition(e.to_string())
            }
            RefundError::Conflict(_) => crate::utils::AppError::ConcurrencyConflict(e.to_string()),
            RefundError::Order(inner) => inner.into(),
            RefundError::Storage(inner) => inner.into(),
        }
    }
}

/// 创建退款请求的输入
#[derive(Debug, Clone)]
pub struct CreateRefund {
    pub event_id: String,
    pub refund_type: RefundType,
    /// 显式订单列表；`EVENT_CANCELLATION` 时可为空，表示该活动
    /// 全部已支付订单。
    pub order_ids: Vec<String>,
    pub reason: Option<String>,
}

/// 退款服务
#[derive(Clone)]
pub struct RefundService {
    store: Store,
    orders: OrderService,
    ledger: InventoryLedger,
    tickets: TicketService,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
}

impl RefundService {
    pub fn new(
        store: Store,
        orders: OrderService,
        ledger: InventoryLedger,
        tickets: TicketService,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            orders,
            ledger,
            tickets,
            notifier,
            retry: RetryPolicy::from_config(config),
        }
    }

    // ========== 创建与审批 ==========

    /// 创建退款请求
    ///
    /// 汇总目标订单并在创建时刻快照 `total_refund_amount`。
    /// 显式列表中的订单必须存在且处于 `PAID`。
    pub fn create(&self, input: CreateRefund) -> Result<RefundRequest, RefundError> {
        let targets: Vec<Order> = if input.order_ids.is_empty() {
            if input.refund_type != RefundType::EventCancellation {
                return Err(RefundError::Validation(
                    "Order list is required unless the whole event is cancelled".to_string(),
                ));
            }
            self.orders
                .list_for_event(&input.event_id, Some(OrderStatus::Paid))?
        } else {
            let mut orders = Vec::with_capacity(input.order_ids.len());
            for order_id in &input.order_ids {
                let order = self.orders.get(order_id)?;
                if order.status != OrderStatus::Paid {
                    return Err(RefundError::Validation(format!(
                        "Order {} is not refundable (status {:?})",
                        order.order_number, order.status
                    )));
                }
                if order.event_id != input.event_id {
                    return Err(RefundError::Validation(format!(
                        "Order {} does not belong to event {}",
                        order.order_number, input.event_id
                    )));
                }
                orders.push(order);
            }
            orders
        };

        if targets.is_empty() {
            return Err(RefundError::Validation(
                "No refundable orders for this request".to_string(),
            ));
        }

        let total: Decimal = targets.iter().map(|o| to_decimal(o.total)).sum();
        let request = RefundRequest {
            id: record_id(),
            event_id: input.event_id,
            refund_type: input.refund_type,
            order_ids: targets.iter().map(|o| o.id.clone()).collect(),
            total_refund_amount: to_f64(round2(total)),
            status: RefundStatus::Pending,
            reason: input.reason,
            refunds_processed: 0,
            refunds_failed: 0,
            processing_errors: Vec::new(),
            created_at: now_millis(),
            processed_at: None,
        };
        self.store
            .insert_new(REFUND_REQUESTS, &request.id, &request)?;

        tracing::info!(
            request_id = %request.id,
            orders = request.order_ids.len(),
            amount = request.total_refund_amount,
            "Refund request created"
        );
        Ok(request)
    }

    pub fn get(&self, request_id: &str) -> Result<RefundRequest, RefundError> {
        self.store
            .get(REFUND_REQUESTS, request_id)?
            .ok_or_else(|| RefundError::NotFound(request_id.to_string()))
    }

    pub fn list_for_event(&self, event_id: &str) -> Result<Vec<RefundRequest>, RefundError> {
        let mut requests: Vec<RefundRequest> = self
            .store
            .scan::<RefundRequest>(REFUND_REQUESTS)?
            .into_iter()
            .filter(|r| r.event_id == event_id)
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    pub async fn approve(&self, request_id: &str) -> Result<RefundRequest, RefundError> {
        self.transition(request_id, RefundStatus::Approved).await
    }

    pub async fn reject(&self, request_id: &str) -> Result<RefundRequest, RefundError> {
        self.transition(request_id, RefundStatus::Rejected).await
    }

    // ========== 执行 ==========

    /// 执行已批准的退款请求
    ///
    /// 逐订单独立处理，失败隔离：一个订单退不动，其余照退，
    /// 失败明细写入请求记录。
    pub async fn process(&self, request_id: &str) -> Result<RefundRequest, RefundError> {
        let request = self.get(request_id)?;
        if request.status != RefundStatus::Approved {
            return Err(RefundError::InvalidTransition {
                from: request.status,
                to: RefundStatus::Processed,
            });
        }

        let mut processed = 0;
        let mut failed = 0;
        let mut errors = Vec::new();

        for order_id in &request.order_ids {
            match self.refund_one(order_id).await {
                Ok(()) => processed += 1,
                Err(e) => {
                    failed += 1;
                    errors.push(format!("{}: {}", order_id, e));
                    tracing::warn!(order_id = %order_id, error = %e, "Refund failed for order");
                }
            }
        }

        let result = self
            .update_request(request_id, |current| {
                if !current.status.can_transition(RefundStatus::Processed) {
                    return Err(RefundError::InvalidTransition {
                        from: current.status,
                        to: RefundStatus::Processed,
                    });
                }
                let mut updated = current.clone();
                updated.status = RefundStatus::Processed;
                updated.refunds_processed = processed;
                updated.refunds_failed = failed;
                updated.processing_errors = errors.clone();
                updated.processed_at = Some(now_millis());
                Ok(Some(updated))
            })
            .await?;

        tracing::info!(
            request_id = %request_id,
            processed,
            failed,
            "Refund request executed"
        );
        Ok(result)
    }

    /// 退款单个订单
    async fn refund_one(&self, order_id: &str) -> Result<(), RefundError> {
        let order = self.orders.get(order_id)?;
        if order.status != OrderStatus::Paid {
            return Err(RefundError::Validation(format!(
                "not refundable in status {:?}",
                order.status
            )));
        }

        self.tickets
            .transition_for_order(order_id, TicketStatus::Refunded)
            .await
            .map_err(OrderError::from)?;

        for item in &order.items {
            self.ledger
                .return_sold(&item.ticket_type_id, item.quantity)
                .await
                .map_err(OrderError::from)?;
        }

        let refunded = self
            .orders
            .update_order(order_id, |current| {
                if current.status == OrderStatus::Refunded {
                    return Ok(None);
                }
                if !current.status.can_transition(OrderStatus::Refunded) {
                    return Err(OrderError::InvalidTransition {
                        from: current.status,
                        to: OrderStatus::Refunded,
                    });
                }
                let mut updated = current.clone();
                updated.status = OrderStatus::Refunded;
                updated.refunded_at = Some(now_millis());
                Ok(Some(updated))
            })
            .await?;

        let notifier = self.notifier.clone();
        let amount = refunded.total;
        tokio::spawn(async move {
            notifier.refund_processed(&refunded, amount).await;
        });
        Ok(())
    }

    // ========== 内部 ==========

    async fn transition(
        &self,
        request_id: &str,
        target: RefundStatus,
    ) -> Result<RefundRequest, RefundError> {
        self.update_request(request_id, |current| {
            if !current.status.can_transition(target) {
                return Err(RefundError::InvalidTransition {
                    from: current.status,
                    to: target,
                });
            }
            let mut updated = current.clone();
            updated.status = target;
            Ok(Some(updated))
        })
        .await
    }

    async fn update_request(
        &self,
        request_id: &str,
        apply: impl Fn(&RefundRequest) -> Result<Option<RefundRequest>, RefundError>,
    ) -> Result<RefundRequest, RefundError> {
        let mut attempt = 0;
        loop {
            let (version, current) = self
                .store
                .get_versioned::<RefundRequest>(REFUND_REQUESTS, request_id)?
                .ok_or_else(|| RefundError::NotFound(request_id.to_string()))?;

            let Some(updated) = apply(&current)? else {
                return Ok(current);
            };

            if self
                .store
                .put_if_version(REFUND_REQUESTS, request_id, version, &updated)?
            {
                return Ok(updated);
            }

            attempt += 1;
            if attempt > self.retry.max_retries {
                return Err(RefundError::Conflict(request_id.to_string()));
            }
            tokio::time::sleep(self.retry.delay(attempt)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::testkit;

    fn refund_service(fixture: &testkit::Fixture) -> RefundService {
        let mut config = Config::from_env();
        config.conflict_max_retries = 50;
        config.conflict_retry_base_ms = 1;
        RefundService::new(
            fixture.store.clone(),
            fixture.orders.clone(),
            fixture.ledger.clone(),
            fixture.tickets.clone(),
            Arc::new(crate::services::LogNotifier),
            &config,
        )
    }

    async fn paid_order(fixture: &testkit::Fixture, quantity: u32) -> Order {
        let order = fixture
            .orders
            .checkout(testkit::input("ev-1", &[("tt-ga", quantity)], None))
            .await
            .unwrap();
        fixture
            .orders
            .confirm_payment(&order.id, "pay-x")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_single_order_refund_full_path() {
        let fixture = testkit::fixture();
        testkit::seed_ticket_type(&fixture.store, "tt-ga", 25.0, 100);
        let refunds = refund_service(&fixture);
        let order = paid_order(&fixture, 2).await;

        let request = refunds
            .create(CreateRefund {
                event_id: "ev-1".to_string(),
                refund_type: RefundType::SingleOrder,
                order_ids: vec![order.id.clone()],
                reason: Some("customer request".to_string()),
            })
            .unwrap();
        assert_eq!(request.status, RefundStatus::Pending);
        assert_eq!(request.total_refund_amount, 50.0);

        refunds.approve(&request.id).await.unwrap();
        let done = refunds.process(&request.id).await.unwrap();

        assert_eq!(done.status, RefundStatus::Processed);
        assert_eq!(done.refunds_processed, 1);
        assert_eq!(done.refunds_failed, 0);
        assert!(done.processed_at.is_some());

        let refunded = fixture.orders.get(&order.id).unwrap();
        assert_eq!(refunded.status, OrderStatus::Refunded);
        assert!(refunded.refunded_at.is_some());

        // Tickets voided and inventory returned
        let tickets = fixture.tickets.tickets_for_order(&order.id).unwrap();
        assert!(tickets.iter().all(|t| t.status == TicketStatus::Refunded));
        assert_eq!(fixture.ledger.availability("tt-ga").unwrap().sold, 0);
    }

    #[tokio::test]
    async fn test_event_cancellation_targets_all_paid_orders() {
        let fixture = testkit::fixture();
        testkit::seed_ticket_type(&fixture.store, "tt-ga", 10.0, 100);
        let refunds = refund_service(&fixture);

        let a = paid_order(&fixture, 1).await;
        let b = paid_order(&fixture, 2).await;
        // A pending order is not part of an event cancellation
        fixture
            .orders
            .checkout(testkit::input("ev-1", &[("tt-ga", 1)], None))
            .await
            .unwrap();

        let request = refunds
            .create(CreateRefund {
                event_id: "ev-1".to_string(),
                refund_type: RefundType::EventCancellation,
                order_ids: vec![],
                reason: None,
            })
            .unwrap();

        assert_eq!(request.order_ids.len(), 2);
        assert_eq!(request.total_refund_amount, 30.0);
        assert!(request.order_ids.contains(&a.id));
        assert!(request.order_ids.contains(&b.id));
    }

    #[tokio::test]
    async fn test_bulk_refund_isolates_failures() {
        let fixture = testkit::fixture();
        testkit::seed_ticket_type(&fixture.store, "tt-ga", 20.0, 100);
        let refunds = refund_service(&fixture);

        let good = paid_order(&fixture, 1).await;
        let doomed = paid_order(&fixture, 1).await;

        let request = refunds
            .create(CreateRefund {
                event_id: "ev-1".to_string(),
                refund_type: RefundType::BulkRefund,
                order_ids: vec![good.id.clone(), doomed.id.clone()],
                reason: None,
            })
            .unwrap();
        refunds.approve(&request.id).await.unwrap();

        // One target order is cancelled between approval and execution
        fixture.orders.cancel(&doomed.id, None).await.unwrap();

        let done = refunds.process(&request.id).await.unwrap();
        assert_eq!(done.status, RefundStatus::Processed);
        assert_eq!(done.refunds_processed, 1);
        assert_eq!(done.refunds_failed, 1);
        assert_eq!(done.processing_errors.len(), 1);
        assert!(done.processing_errors[0].contains(&doomed.id));

        // The healthy order still got refunded
        assert_eq!(
            fixture.orders.get(&good.id).unwrap().status,
            OrderStatus::Refunded
        );
    }

    #[tokio::test]
    async fn test_create_rejects_unpaid_explicit_order() {
        let fixture = testkit::fixture();
        testkit::seed_ticket_type(&fixture.store, "tt-ga", 20.0, 100);
        let refunds = refund_service(&fixture);

        let pending = fixture
            .orders
            .checkout(testkit::input("ev-1", &[("tt-ga", 1)], None))
            .await
            .unwrap();

        let err = refunds
            .create(CreateRefund {
                event_id: "ev-1".to_string(),
                refund_type: RefundType::SingleOrder,
                order_ids: vec![pending.id],
                reason: None,
            })
            .unwrap_err();
        assert!(matches!(err, RefundError::Validation(_)));
    }

    #[tokio::test]
    async fn test_process_requires_approval() {
        let fixture = testkit::fixture();
        testkit::seed_ticket_type(&fixture.store, "tt-ga", 20.0, 100);
        let refunds = refund_service(&fixture);
        let order = paid_order(&fixture, 1).await;

        let request = refunds
            .create(CreateRefund {
                event_id: "ev-1".to_string(),
                refund_type: RefundType::SingleOrder,
                order_ids: vec![order.id],
                reason: None,
            })
            .unwrap();

        let err = refunds.process(&request.id).await.unwrap_err();
        assert!(matches!(err, RefundError::InvalidTransition { .. }));

        // A rejected request can never be processed
        refunds.reject(&request.id).await.unwrap();
        let err = refunds.process(&request.id).await.unwrap_err();
        assert!(matches!(err, RefundError::InvalidTransition { .. }));
    }
}
