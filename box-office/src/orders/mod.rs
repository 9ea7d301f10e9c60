//! 订单生命周期
//!
//! 状态机: `PENDING -> PAID -> {CANCELLED, REFUNDED}`，以及
//! `PENDING -> CANCELLED` (放弃结账 / 预留超时)。
//!
//! - [`checkout`]: 结账，全有或全无地预留库存并定价
//! - [`payment`]: 支付确认，预留转售出、签发门票
//! - [`numbers`]: 按年递增的人读订单号
//!
//! 订单记录本身也走条件写：状态转换在最新快照上校验
//! [`OrderStatus::can_transition`]，非法转换一律拒绝。

pub mod checkout;
pub mod numbers;
pub mod payment;

#[cfg(test)]
pub(crate) mod testkit;

pub use checkout::{CheckoutInput, CheckoutLine};

use std::sync::Arc;

use shared::models::{Order, OrderStatus, TicketStatus};
use shared::util::now_millis;
use thiserror::Error;

use crate::core::Config;
use crate::db::{ORDERS, ORDER_NUMBER_IDX, RetryPolicy, Store, StorageError};
use crate::inventory::{InventoryLedger, LedgerError};
use crate::pricing::{PromoError, PromoValidator};
use crate::services::Notifier;
use crate::tickets::{TicketError, TicketService};

/// 订单操作错误
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Order cannot transition from {from:?} to {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Concurrent update conflict on order {0}, retries exhausted")]
    Conflict(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Promo(#[from] PromoError),

    #[error(transparent)]
    Ticket(#[from] TicketError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<OrderError> for crate::utils::AppError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NotFound(msg) => crate::utils::AppError::NotFound(msg),
            OrderError::Validation(msg) => crate::utils::AppError::Validation(msg),
            OrderError::InvalidTransition { .. } => {
                crate::utils::AppError::InvalidStateTransition(e.to_string())
            }
            OrderError::Conflict(_) => crate::utils::AppError::ConcurrencyConflict(e.to_string()),
            OrderError::Ledger(inner) => inner.into(),
            OrderError::Promo(inner) => inner.into(),
            OrderError::Ticket(inner) => inner.into(),
            OrderError::Storage(inner) => inner.into(),
        }
    }
}

/// 订单服务
#[derive(Clone)]
pub struct OrderService {
    store: Store,
    ledger: InventoryLedger,
    tickets: TicketService,
    promos: Arc<PromoValidator>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    reservation_ttl_secs: u64,
}

impl OrderService {
    pub fn new(
        store: Store,
        ledger: InventoryLedger,
        tickets: TicketService,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        Self {
            promos: Arc::new(PromoValidator::new(store.clone())),
            store,
            ledger,
            tickets,
            notifier,
            retry: RetryPolicy::from_config(config),
            reservation_ttl_secs: config.reservation_ttl_secs,
        }
    }

    // ========== 查询 ==========

    pub fn get(&self, order_id: &str) -> Result<Order, OrderError> {
        self.store
            .get(ORDERS, order_id)?
            .ok_or_else(|| OrderError::NotFound(order_id.to_string()))
    }

    pub fn get_by_number(&self, order_number: &str) -> Result<Order, OrderError> {
        let id = self
            .store
            .get_index(ORDER_NUMBER_IDX, order_number)?
            .ok_or_else(|| OrderError::NotFound(order_number.to_string()))?;
        self.get(&id)
    }

    /// 某活动下的订单，可按状态过滤，按创建时间倒序
    pub fn list_for_event(
        &self,
        event_id: &str,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, OrderError> {
        let mut orders: Vec<Order> = self
            .store
            .scan::<Order>(ORDERS)?
            .into_iter()
            .filter(|o| o.event_id == event_id)
            .filter(|o| status.is_none_or(|s| o.status == s))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    // ========== 取消 ==========

    /// 取消订单
    ///
    /// - `PENDING`: 释放预留后取消
    /// - `PAID`: 门票作废、售出数退回可售后取消（无退款核算的行政取消）
    /// - 终态订单返回 [`OrderError::InvalidTransition`]
    ///
    /// 副作用（释放/退回）按读到的状态分支执行，状态写入时要求记录
    /// 仍处于该分支。并发的支付确认把订单推进到 `PAID` 时，按最新
    /// 快照重走 `PAID` 分支，不会留下未作废的门票或未退回的售出数。
    pub async fn cancel(&self, order_id: &str, note: Option<&str>) -> Result<Order, OrderError> {
        let mut attempt = 0;
        loop {
            let order = self.get(order_id)?;
            if let Some(cancelled) = self.cancel_once(&order, note).await? {
                return Ok(cancelled);
            }
            attempt += 1;
            if attempt > self.retry.max_retries {
                return Err(OrderError::Conflict(order_id.to_string()));
            }
            tokio::time::sleep(self.retry.delay(attempt)).await;
        }
    }

    /// 单次取消尝试；状态在副作用与状态写之间被并发推进时返回 `None`
    async fn cancel_once(
        &self,
        order: &Order,
        note: Option<&str>,
    ) -> Result<Option<Order>, OrderError> {
        match order.status {
            OrderStatus::Pending => {
                self.ledger.release_all_for_order(&order.id).await?;
            }
            OrderStatus::Paid => {
                self.tickets
                    .transition_for_order(&order.id, TicketStatus::Cancelled)
                    .await?;
                for item in &order.items {
                    self.ledger
                        .return_sold(&item.ticket_type_id, item.quantity)
                        .await?;
                }
            }
            from => {
                return Err(OrderError::InvalidTransition {
                    from,
                    to: OrderStatus::Cancelled,
                });
            }
        }

        let seen = order.status;
        let note = note.map(str::to_string);
        let updated = self
            .update_order(&order.id, |current| {
                if current.status == OrderStatus::Cancelled {
                    return Ok(None);
                }
                // 副作用执行后状态被并发修改，放弃本次写入
                if current.status != seen {
                    return Ok(None);
                }
                let mut updated = current.clone();
                updated.status = OrderStatus::Cancelled;
                updated.cancelled_at = Some(now_millis());
                updated.error_note = note.clone();
                Ok(Some(updated))
            })
            .await?;

        if updated.status == OrderStatus::Cancelled {
            Ok(Some(updated))
        } else {
            Ok(None)
        }
    }

    // ========== 预留超时 ==========

    /// 清扫过期结账：释放过期预留，把对应的 `PENDING` 订单转为取消
    ///
    /// 由后台定时任务周期调用，返回取消的订单数。
    pub async fn expire_stale_checkouts(&self) -> Result<u32, OrderError> {
        let order_ids = self
            .ledger
            .expire_stale_reservations(self.reservation_ttl_secs)
            .await?;

        let mut cancelled = 0;
        for order_id in order_ids {
            // 预留可能属于尚未持久化订单的结账，订单不存在直接跳过
            if self.store.get::<Order>(ORDERS, &order_id)?.is_none() {
                continue;
            }
            let updated = self
                .update_order(&order_id, |current| {
                    if current.status != OrderStatus::Pending {
                        return Ok(None);
                    }
                    let mut updated = current.clone();
                    updated.status = OrderStatus::Cancelled;
                    updated.cancelled_at = Some(now_millis());
                    updated.error_note = Some("Checkout expired".to_string());
                    Ok(Some(updated))
                })
                .await?;
            if updated.status == OrderStatus::Cancelled {
                cancelled += 1;
            }
        }

        if cancelled > 0 {
            tracing::info!(count = cancelled, "Cancelled expired checkouts");
        }
        Ok(cancelled)
    }

    // ========== 内部 ==========

    /// 订单记录的乐观更新循环
    ///
    /// `apply` 返回 `None` 表示无需写入（幂等快捷路径），
    /// 此时返回当前快照。
    pub(crate) async fn update_order(
        &self,
        order_id: &str,
        apply: impl Fn(&Order) -> Result<Option<Order>, OrderError>,
    ) -> Result<Order, OrderError> {
        let mut attempt = 0;
        loop {
            let (version, current) = self
                .store
                .get_versioned::<Order>(ORDERS, order_id)?
                .ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;

            let Some(updated) = apply(&current)? else {
                return Ok(current);
            };

            if self.store.put_if_version(ORDERS, order_id, version, &updated)? {
                return Ok(updated);
            }

            attempt += 1;
            if attempt > self.retry.max_retries {
                return Err(OrderError::Conflict(order_id.to_string()));
            }
            tokio::time::sleep(self.retry.delay(attempt)).await;
        }
    }
}
