//! 库存台账
//!
//! 票种计数器 (`capacity / sold / reserved`) 的唯一修改入口。
//! 核心不变量: `sold + reserved <= capacity`，在任何并发交错下都不被破坏。
//!
//! # 并发模型
//!
//! 每次计数器修改都是一个乐观更新循环：
//!
//! 1. 读取带版本号的票种记录
//! 2. 在快照上校验前置条件并计算新计数
//! 3. 条件写回（版本号未变才生效），预留记录在同一事务内增删
//! 4. 版本冲突则退避后重试，重试耗尽返回 [`LedgerError::Conflict`]
//!
//! 确定性失败（库存不足、票种不存在）直接返回，不参与重试。
//!
//! # 预留生命周期
//!
//! `reserve` 在结账时占位并写入预留记录；`commit` 在支付确认时把
//! 预留转为售出；`release` 把预留退回可售。三者都以
//! `(order_id, ticket_type_id)` 为幂等键，重复调用不会重复计数。

use shared::models::{Reservation, TicketType};
use shared::util::now_millis;
use thiserror::Error;

use crate::db::{RESERVATIONS, RetryPolicy, Store, StorageError, TICKET_TYPES};

/// 台账操作错误
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ticket type not found: {0}")]
    NotFound(String),

    #[error(
        "Insufficient inventory for {ticket_type_id}: requested {requested}, available {available}"
    )]
    Insufficient {
        ticket_type_id: String,
        requested: u32,
        available: u32,
    },

    #[error("No reservation to commit for order {order_id} on {ticket_type_id}")]
    NoReservation {
        order_id: String,
        ticket_type_id: String,
    },

    #[error("Concurrent update conflict on {0}, retries exhausted")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<LedgerError> for crate::utils::AppError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound(id) => {
                crate::utils::AppError::NotFound(format!("Ticket type not found: {}", id))
            }
            LedgerError::Insufficient { .. } => {
                crate::utils::AppError::InsufficientInventory(e.to_string())
            }
            LedgerError::NoReservation { .. } => crate::utils::AppError::Conflict(e.to_string()),
            LedgerError::Conflict(_) => crate::utils::AppError::ConcurrencyConflict(e.to_string()),
            LedgerError::Storage(inner) => inner.into(),
        }
    }
}

/// 计数器快照 (对外的可用量查询结果)
#[derive(Debug, Clone, serde::Serialize)]
pub struct Availability {
    pub ticket_type_id: String,
    pub capacity: u32,
    pub sold: u32,
    pub reserved: u32,
    pub available: u32,
}

/// 与票种条件写同事务执行的预留记录操作
enum ReservationOp {
    Put(Reservation),
    Delete(String),
}

/// 库存台账
#[derive(Clone)]
pub struct InventoryLedger {
    store: Store,
    retry: RetryPolicy,
}

impl InventoryLedger {
    pub fn new(store: Store, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// 乐观更新循环：`apply` 在每次尝试的最新快照上运行
    async fn update(
        &self,
        ticket_type_id: &str,
        apply: impl Fn(
            &TicketType,
        )
            -> Result<Option<(TicketType, Option<ReservationOp>)>, LedgerError>,
    ) -> Result<TicketType, LedgerError> {
        let mut attempt = 0;
        loop {
            let (version, current): (u64, TicketType) = self
                .store
                .get_versioned(TICKET_TYPES, ticket_type_id)?
                .ok_or_else(|| LedgerError::NotFound(ticket_type_id.to_string()))?;

            // None = 幂等快捷路径，无需写入
            let Some((updated, op)) = apply(&current)? else {
                return Ok(current);
            };

            debug_assert!(updated.sold + updated.reserved <= updated.capacity);

            let written = self.store.put_if_version_with(
                TICKET_TYPES,
                ticket_type_id,
                version,
                &updated,
                |txn| match &op {
                    Some(ReservationOp::Put(reservation)) => self.store.put_plain_txn(
                        txn,
                        RESERVATIONS,
                        &Reservation::key(&reservation.order_id, &reservation.ticket_type_id),
                        reservation,
                    ),
                    Some(ReservationOp::Delete(key)) => {
                        self.store.delete_plain_txn(txn, RESERVATIONS, key)
                    }
                    None => Ok(()),
                },
            )?;

            if written {
                return Ok(updated);
            }

            attempt += 1;
            if attempt > self.retry.max_retries {
                tracing::warn!(
                    ticket_type_id = %ticket_type_id,
                    attempts = attempt,
                    "Inventory update conflict, retries exhausted"
                );
                return Err(LedgerError::Conflict(ticket_type_id.to_string()));
            }
            tokio::time::sleep(self.retry.delay(attempt)).await;
        }
    }

    /// 预留 `quantity` 张票，占位到支付确认或超时
    ///
    /// 可用量不足时返回 [`LedgerError::Insufficient`]，附带当前可用数。
    /// 同一 `(order_id, ticket_type_id)` 的重复调用是无副作用的。
    pub async fn reserve(
        &self,
        order_id: &str,
        ticket_type_id: &str,
        quantity: u32,
    ) -> Result<(), LedgerError> {
        let key = Reservation::key(order_id, ticket_type_id);
        let order_id = order_id.to_string();

        self.update(ticket_type_id, |current| {
            // 已有预留记录：重试调用，直接成功
            if self
                .store
                .get_plain::<Reservation>(RESERVATIONS, &key)?
                .is_some()
            {
                return Ok(None);
            }

            let available = current.available();
            if available < quantity {
                return Err(LedgerError::Insufficient {
                    ticket_type_id: current.id.clone(),
                    requested: quantity,
                    available,
                });
            }

            let mut updated = current.clone();
            updated.reserved += quantity;
            let reservation = Reservation {
                order_id: order_id.clone(),
                ticket_type_id: current.id.clone(),
                quantity,
                created_at: now_millis(),
            };
            Ok(Some((updated, Some(ReservationOp::Put(reservation)))))
        })
        .await?;
        Ok(())
    }

    /// 释放预留，把占位退回可售
    ///
    /// 预留记录不存在时静默成功（重复释放、已提交或已被清扫）。
    pub async fn release(&self, order_id: &str, ticket_type_id: &str) -> Result<(), LedgerError> {
        let key = Reservation::key(order_id, ticket_type_id);

        self.update(ticket_type_id, |current| {
            let Some(reservation) = self.store.get_plain::<Reservation>(RESERVATIONS, &key)? else {
                return Ok(None);
            };

            let mut updated = current.clone();
            // 计数器以 0 为界，预留记录与计数器不一致时不让计数器下溢
            updated.reserved = updated.reserved.saturating_sub(reservation.quantity);
            Ok(Some((updated, Some(ReservationOp::Delete(key.clone())))))
        })
        .await?;
        Ok(())
    }

    /// 把预留转为售出（支付确认）
    ///
    /// 必须存在对应的预留记录；`sold + reserved` 之和不变，
    /// 不变量天然保持。
    pub async fn commit(&self, order_id: &str, ticket_type_id: &str) -> Result<(), LedgerError> {
        let key = Reservation::key(order_id, ticket_type_id);
        let order_id = order_id.to_string();

        self.update(ticket_type_id, |current| {
            let Some(reservation) = self.store.get_plain::<Reservation>(RESERVATIONS, &key)? else {
                return Err(LedgerError::NoReservation {
                    order_id: order_id.clone(),
                    ticket_type_id: current.id.clone(),
                });
            };

            let mut updated = current.clone();
            updated.reserved = updated.reserved.saturating_sub(reservation.quantity);
            updated.sold += reservation.quantity;
            Ok(Some((updated, Some(ReservationOp::Delete(key.clone())))))
        })
        .await?;
        Ok(())
    }

    /// 释放某订单的全部预留（结账失败回滚、订单取消）
    pub async fn release_all_for_order(&self, order_id: &str) -> Result<(), LedgerError> {
        let reservations: Vec<Reservation> = self.store.scan_plain(RESERVATIONS)?;
        for reservation in reservations {
            if reservation.order_id == order_id {
                self.release(order_id, &reservation.ticket_type_id).await?;
            }
        }
        Ok(())
    }

    /// 退款归还：把已售出数量退回可售
    ///
    /// 以 0 为界钳制，重复归还不会把 `sold` 减成负数。
    pub async fn return_sold(
        &self,
        ticket_type_id: &str,
        quantity: u32,
    ) -> Result<(), LedgerError> {
        self.update(ticket_type_id, |current| {
            let mut updated = current.clone();
            updated.sold = updated.sold.saturating_sub(quantity);
            Ok(Some((updated, None)))
        })
        .await?;
        Ok(())
    }

    /// 清扫过期预留
    ///
    /// 释放创建时间早于 `ttl_secs` 之前的所有预留，返回受影响的
    /// 订单 ID（由订单模块将其转入取消状态）。
    pub async fn expire_stale_reservations(
        &self,
        ttl_secs: u64,
    ) -> Result<Vec<String>, LedgerError> {
        let cutoff = now_millis() - (ttl_secs as i64) * 1_000;
        let reservations: Vec<Reservation> = self.store.scan_plain(RESERVATIONS)?;

        let mut expired_orders = Vec::new();
        for reservation in reservations {
            if reservation.created_at < cutoff {
                self.release(&reservation.order_id, &reservation.ticket_type_id)
                    .await?;
                if !expired_orders.contains(&reservation.order_id) {
                    expired_orders.push(reservation.order_id);
                }
            }
        }

        if !expired_orders.is_empty() {
            tracing::info!(
                orders = expired_orders.len(),
                "Released stale checkout reservations"
            );
        }
        Ok(expired_orders)
    }

    /// 当前计数器快照
    pub fn availability(&self, ticket_type_id: &str) -> Result<Availability, LedgerError> {
        let ticket_type: TicketType = self
            .store
            .get(TICKET_TYPES, ticket_type_id)?
            .ok_or_else(|| LedgerError::NotFound(ticket_type_id.to_string()))?;
        Ok(Availability {
            available: ticket_type.available(),
            ticket_type_id: ticket_type.id,
            capacity: ticket_type.capacity,
            sold: ticket_type.sold,
            reserved: ticket_type.reserved,
        })
    }
}
