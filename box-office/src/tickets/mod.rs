//! 门票生命周期
//!
//! 签发、核销 (扫码入场)、状态查询。
//!
//! 核销是线性一致的 exactly-once 操作：同一张票的并发扫码最多只有
//! 一个成功，其余得到首扫的审计信息。实现方式与库存台账相同——
//! 对票记录做条件写，冲突后重读最新状态再判定。

pub mod codegen;

use std::collections::HashMap;

use shared::models::{Order, Ticket, TicketStatus};
use shared::util::{now_millis, record_id};
use thiserror::Error;

use crate::core::Config;
use crate::db::{RetryPolicy, Store, StorageError, TICKETS, TICKET_CODE_IDX};

use codegen::{build_qr_payload, generate_code};

/// 门票操作错误
#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Ticket not found")]
    NotFound,

    #[error("Could not allocate a unique ticket code after {0} attempts")]
    CodeSpaceExhausted(u32),

    #[error("Concurrent update conflict on ticket {0}, retries exhausted")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<TicketError> for crate::utils::AppError {
    fn from(e: TicketError) -> Self {
        match e {
            TicketError::NotFound => {
                crate::utils::AppError::NotFound("Ticket not found".to_string())
            }
            TicketError::CodeSpaceExhausted(_) => crate::utils::AppError::Internal(e.to_string()),
            TicketError::Conflict(_) => crate::utils::AppError::ConcurrencyConflict(e.to_string()),
            TicketError::Storage(inner) => inner.into(),
        }
    }
}

/// 核销结果
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanOutcome {
    /// 本次扫码成功入场
    Accepted { ticket: Ticket },
    /// 已被使用，附首扫审计信息
    AlreadyUsed {
        used_at: Option<i64>,
        used_by: Option<String>,
        scan_location: Option<String>,
    },
    /// 票不处于可入场状态 (已取消 / 已退款)
    NotValid { status: TicketStatus },
}

/// 门票服务
#[derive(Clone)]
pub struct TicketService {
    store: Store,
    retry: RetryPolicy,
    code_max_retries: u32,
    qr_signing_key: String,
}

impl TicketService {
    pub fn new(store: Store, config: &Config) -> Self {
        Self {
            store,
            retry: RetryPolicy::from_config(config),
            code_max_retries: config.ticket_code_max_retries,
            qr_signing_key: config.qr_signing_key.clone(),
        }
    }

    // ========== 签发 ==========

    /// 为已支付订单签发门票，每个入场名额一张
    ///
    /// 按名额幂等：已有的票保留，只补齐每个票种的缺口，中途失败后
    /// 重试的支付回调会收敛到名额数恰好相等。票码全局唯一，碰撞时
    /// 换码重试，重试耗尽视为内部错误。
    pub fn issue_for_order(&self, order: &Order) -> Result<Vec<Ticket>, TicketError> {
        let mut tickets = self.tickets_for_order(&order.id)?;
        let mut held: HashMap<String, u32> = HashMap::new();
        for ticket in &tickets {
            *held.entry(ticket.ticket_type_id.clone()).or_default() += 1;
        }

        let mut issued = 0;
        for item in &order.items {
            let existing = held.get(&item.ticket_type_id).copied().unwrap_or(0);
            for _ in existing..item.quantity {
                tickets.push(self.issue_one(order, &item.ticket_type_id)?);
                issued += 1;
            }
        }

        if issued > 0 {
            tracing::info!(
                order_id = %order.id,
                count = issued,
                "Issued tickets"
            );
        }
        Ok(tickets)
    }

    fn issue_one(&self, order: &Order, ticket_type_id: &str) -> Result<Ticket, TicketError> {
        for _ in 0..self.code_max_retries {
            let code = generate_code();
            let id = record_id();
            let issued_at = now_millis();
            let ticket = Ticket {
                qr_payload: build_qr_payload(&id, &code, issued_at, &self.qr_signing_key),
                id: id.clone(),
                order_id: order.id.clone(),
                ticket_type_id: ticket_type_id.to_string(),
                event_id: order.event_id.clone(),
                code: code.clone(),
                status: TicketStatus::Valid,
                attendee_name: order.customer_name.clone(),
                attendee_email: order.customer_email.clone(),
                seat_info: None,
                issued_at,
                used_at: None,
                used_by: None,
                scan_location: None,
            };

            // 码与记录同事务写入，碰撞时换码重试
            if self
                .store
                .insert_with_index(TICKETS, &id, &ticket, TICKET_CODE_IDX, &code)?
            {
                return Ok(ticket);
            }
        }
        Err(TicketError::CodeSpaceExhausted(self.code_max_retries))
    }

    // ========== 核销 ==========

    /// 扫码入场：`VALID -> USED`，exactly-once
    ///
    /// 并发扫同一张票时恰有一个调用方拿到 [`ScanOutcome::Accepted`]，
    /// 其余拿到 [`ScanOutcome::AlreadyUsed`] 与首扫的审计字段。
    pub async fn scan(
        &self,
        code: &str,
        scanned_by: &str,
        location: Option<&str>,
    ) -> Result<ScanOutcome, TicketError> {
        let id = self
            .store
            .get_index(TICKET_CODE_IDX, code)?
            .ok_or(TicketError::NotFound)?;

        let mut attempt = 0;
        loop {
            let (version, ticket): (u64, Ticket) = self
                .store
                .get_versioned(TICKETS, &id)?
                .ok_or(TicketError::NotFound)?;

            match ticket.status {
                TicketStatus::Used => {
                    return Ok(ScanOutcome::AlreadyUsed {
                        used_at: ticket.used_at,
                        used_by: ticket.used_by,
                        scan_location: ticket.scan_location,
                    });
                }
                TicketStatus::Cancelled | TicketStatus::Refunded => {
                    return Ok(ScanOutcome::NotValid {
                        status: ticket.status,
                    });
                }
                TicketStatus::Valid => {}
            }

            let mut updated = ticket;
            updated.status = TicketStatus::Used;
            updated.used_at = Some(now_millis());
            updated.used_by = Some(scanned_by.to_string());
            updated.scan_location = location.map(str::to_string);

            if self.store.put_if_version(TICKETS, &id, version, &updated)? {
                tracing::info!(ticket_id = %id, scanned_by = %scanned_by, "Ticket checked in");
                return Ok(ScanOutcome::Accepted { ticket: updated });
            }

            // 条件写失败：可能是并发扫码赢了，重读后重新判定
            attempt += 1;
            if attempt > self.retry.max_retries {
                return Err(TicketError::Conflict(id));
            }
            tokio::time::sleep(self.retry.delay(attempt)).await;
        }
    }

    // ========== 查询与批量状态变更 ==========

    /// 按码查询，从不修改状态
    pub fn status_by_code(&self, code: &str) -> Result<Ticket, TicketError> {
        let id = self
            .store
            .get_index(TICKET_CODE_IDX, code)?
            .ok_or(TicketError::NotFound)?;
        self.store.get(TICKETS, &id)?.ok_or(TicketError::NotFound)
    }

    /// 校验 QR 负载是否完整未被篡改
    pub fn verify_qr(&self, payload: &str) -> bool {
        codegen::verify_qr_payload(payload, &self.qr_signing_key)
    }

    pub fn tickets_for_order(&self, order_id: &str) -> Result<Vec<Ticket>, TicketError> {
        let all: Vec<Ticket> = self.store.scan(TICKETS)?;
        Ok(all.into_iter().filter(|t| t.order_id == order_id).collect())
    }

    /// 将订单下所有允许转移的门票置为目标状态（退款 / 取消）
    ///
    /// 不允许的转移（如 `CANCELLED -> REFUNDED`）被跳过而不是报错，
    /// 批量操作以尽力完成为准。
    pub async fn transition_for_order(
        &self,
        order_id: &str,
        target: TicketStatus,
    ) -> Result<u32, TicketError> {
        let tickets = self.tickets_for_order(order_id)?;
        let mut changed = 0;

        for ticket in tickets {
            let mut attempt = 0;
            loop {
                let Some((version, current)) =
                    self.store.get_versioned::<Ticket>(TICKETS, &ticket.id)?
                else {
                    break;
                };
                if !current.status.can_transition(target) {
                    break;
                }

                let mut updated = current;
                updated.status = target;
                if self
                    .store
                    .put_if_version(TICKETS, &ticket.id, version, &updated)?
                {
                    changed += 1;
                    break;
                }

                attempt += 1;
                if attempt > self.retry.max_retries {
                    return Err(TicketError::Conflict(ticket.id.clone()));
                }
                tokio::time::sleep(self.retry.delay(attempt)).await;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{OrderItem, OrderStatus};

    fn test_service() -> TicketService {
        let store = Store::open_in_memory().unwrap();
        let mut config = Config::default();
        config.conflict_max_retries = 50;
        config.conflict_retry_base_ms = 1;
        TicketService::new(store, &config)
    }

    fn paid_order(quantity: u32) -> Order {
        Order {
            id: record_id(),
            order_number: "ORD-2026-000001".to_string(),
            event_id: "ev-1".to_string(),
            status: OrderStatus::Paid,
            items: vec![OrderItem {
                ticket_type_id: "tt-1".to_string(),
                ticket_type_name: "GA".to_string(),
                quantity,
                unit_price: 25.0,
                discount: 0.0,
                subtotal: 25.0 * quantity as f64,
                total: 25.0 * quantity as f64,
            }],
            subtotal: 25.0 * quantity as f64,
            discount: 0.0,
            fees: 0.0,
            fee_lines: vec![],
            tax: 0.0,
            total: 25.0 * quantity as f64,
            currency: "EUR".to_string(),
            customer_name: "Ada".to_string(),
            customer_email: "ada@example.com".to_string(),
            promo_code_id: None,
            promo_code: None,
            payment_reference: Some("pay-1".to_string()),
            error_note: None,
            created_at: now_millis(),
            paid_at: Some(now_millis()),
            cancelled_at: None,
            refunded_at: None,
        }
    }

    #[test]
    fn test_issue_one_ticket_per_unit() {
        let service = test_service();
        let order = paid_order(3);
        let tickets = service.issue_for_order(&order).unwrap();

        assert_eq!(tickets.len(), 3);
        for ticket in &tickets {
            assert_eq!(ticket.status, TicketStatus::Valid);
            assert_eq!(ticket.order_id, order.id);
            assert_eq!(ticket.attendee_email, "ada@example.com");
            assert!(service.verify_qr(&ticket.qr_payload));
        }

        // Codes are unique
        let mut codes: Vec<_> = tickets.iter().map(|t| t.code.clone()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 3);
    }

    #[test]
    fn test_issue_is_idempotent_per_order() {
        let service = test_service();
        let order = paid_order(2);
        let first = service.issue_for_order(&order).unwrap();
        let second = service.issue_for_order(&order).unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        let mut a: Vec<_> = first.iter().map(|t| t.code.clone()).collect();
        let mut b: Vec<_> = second.iter().map(|t| t.code.clone()).collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn test_issue_tops_up_partial_issuance() {
        let service = test_service();
        let order = paid_order(3);

        // A previous issuance died after the first unit
        let mut partial = order.clone();
        partial.items[0].quantity = 1;
        service.issue_for_order(&partial).unwrap();
        assert_eq!(service.tickets_for_order(&order.id).unwrap().len(), 1);

        let tickets = service.issue_for_order(&order).unwrap();
        assert_eq!(tickets.len(), 3);
        let mut codes: Vec<_> = tickets.iter().map(|t| t.code.clone()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 3);
        assert_eq!(service.tickets_for_order(&order.id).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_scan_marks_used_with_audit() {
        let service = test_service();
        let order = paid_order(1);
        let tickets = service.issue_for_order(&order).unwrap();

        let outcome = service
            .scan(&tickets[0].code, "gate-a", Some("north entrance"))
            .await
            .unwrap();
        match outcome {
            ScanOutcome::Accepted { ticket } => {
                assert_eq!(ticket.status, TicketStatus::Used);
                assert_eq!(ticket.used_by.as_deref(), Some("gate-a"));
                assert_eq!(ticket.scan_location.as_deref(), Some("north entrance"));
                assert!(ticket.used_at.is_some());
            }
            other => panic!("expected Accepted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_second_scan_reports_first_audit() {
        let service = test_service();
        let order = paid_order(1);
        let tickets = service.issue_for_order(&order).unwrap();

        service
            .scan(&tickets[0].code, "gate-a", None)
            .await
            .unwrap();
        let outcome = service
            .scan(&tickets[0].code, "gate-b", None)
            .await
            .unwrap();

        match outcome {
            ScanOutcome::AlreadyUsed { used_by, .. } => {
                assert_eq!(used_by.as_deref(), Some("gate-a"));
            }
            other => panic!("expected AlreadyUsed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_scan_unknown_code() {
        let service = test_service();
        let err = service.scan("XXXX-XXXX-XXXX", "gate-a", None).await;
        assert!(matches!(err, Err(TicketError::NotFound)));
    }

    #[tokio::test]
    async fn test_concurrent_scans_exactly_once() {
        let service = test_service();
        let order = paid_order(1);
        let code = service.issue_for_order(&order).unwrap()[0].code.clone();

        let mut handles = Vec::new();
        for i in 0..8 {
            let service = service.clone();
            let code = code.clone();
            handles.push(tokio::spawn(async move {
                service.scan(&code, &format!("gate-{i}"), None).await
            }));
        }

        let mut accepted = 0;
        let mut already_used = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                ScanOutcome::Accepted { .. } => accepted += 1,
                ScanOutcome::AlreadyUsed { .. } => already_used += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(already_used, 7);
    }

    #[tokio::test]
    async fn test_status_query_never_mutates() {
        let service = test_service();
        let order = paid_order(1);
        let code = service.issue_for_order(&order).unwrap()[0].code.clone();

        let ticket = service.status_by_code(&code).unwrap();
        assert_eq!(ticket.status, TicketStatus::Valid);
        // Still scannable afterwards
        let outcome = service.scan(&code, "gate-a", None).await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Accepted { .. }));
    }

    #[tokio::test]
    async fn test_transition_for_order_skips_disallowed() {
        let service = test_service();
        let order = paid_order(2);
        let tickets = service.issue_for_order(&order).unwrap();

        // Use one ticket, then refund the order's tickets
        service
            .scan(&tickets[0].code, "gate-a", None)
            .await
            .unwrap();
        let changed = service
            .transition_for_order(&order.id, TicketStatus::Refunded)
            .await
            .unwrap();
        // VALID -> REFUNDED and USED -> REFUNDED are both allowed
        assert_eq!(changed, 2);

        // Refunded tickets cannot be scanned
        let outcome = service.scan(&tickets[1].code, "gate-a", None).await.unwrap();
        assert!(matches!(
            outcome,
            ScanOutcome::NotValid {
                status: TicketStatus::Refunded
            }
        ));
    }
}
