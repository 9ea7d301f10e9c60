//! 支付确认
//!
//! 支付网关回调入口。成功路径：预留转售出、订单 `PENDING -> PAID`、
//! 优惠码用量按 orderId 幂等加一、签发门票、旁路通知。
//!
//! 回调可能重试或并发到达：已是 `PAID` 的订单直接返回成功，
//! 不会二次计数或二次签发，但会补齐先前中断的签发缺口。提交失败
//! （预留已被清扫）时订单转 `CANCELLED` 并在 `error_note` 里记下
//! 原因；提交成功后状态写输给并发取消时，已转售出的数量全部退回。

use shared::models::{Order, OrderStatus, PromoCode};
use shared::util::now_millis;

use crate::db::PROMO_CODES;

use super::{OrderError, OrderService};

impl OrderService {
    /// 确认支付
    pub async fn confirm_payment(
        &self,
        order_id: &str,
        payment_reference: &str,
    ) -> Result<Order, OrderError> {
        let order = self.get(order_id)?;

        match order.status {
            // 重试的回调：幂等成功，同时补齐上一次中断留下的缺口
            // （优惠码计数按 orderId 幂等，签发按入场名额幂等）
            OrderStatus::Paid => {
                self.consume_promo(&order).await?;
                self.tickets.issue_for_order(&order)?;
                return Ok(order);
            }
            OrderStatus::Cancelled | OrderStatus::Refunded => {
                return Err(OrderError::InvalidTransition {
                    from: order.status,
                    to: OrderStatus::Paid,
                });
            }
            OrderStatus::Pending => {}
        }

        if let Err(e) = self.commit_lines(&order).await {
            // 并发确认可能已经提交并标记 PAID
            let current = self.get(order_id)?;
            if current.status == OrderStatus::Paid {
                return Ok(current);
            }

            // 真实失败（预留过期被清扫等）：取消订单并记录原因
            let note = format!("Payment confirmation failed: {}", e);
            tracing::warn!(order_id = %order_id, error = %e, "Payment confirmation failed");
            self.update_order(order_id, |current| {
                if current.status != OrderStatus::Pending {
                    return Ok(None);
                }
                let mut updated = current.clone();
                updated.status = OrderStatus::Cancelled;
                updated.cancelled_at = Some(now_millis());
                updated.error_note = Some(note.clone());
                Ok(Some(updated))
            })
            .await?;
            return Err(e);
        }

        let paid = self.mark_paid(&order, payment_reference).await?;

        self.consume_promo(&paid).await?;

        let tickets = self.tickets.issue_for_order(&paid)?;
        tracing::info!(
            order_number = %paid.order_number,
            payment_reference = %payment_reference,
            tickets = tickets.len(),
            "Payment confirmed"
        );

        // 通知是旁路动作，不阻塞也不影响结果
        let notifier = self.notifier.clone();
        let order_for_notify = paid.clone();
        tokio::spawn(async move {
            notifier.tickets_issued(&order_for_notify, &tickets).await;
        });

        Ok(paid)
    }

    /// 库存提交后的 `PENDING -> PAID` 状态写入
    ///
    /// 并发取消在此之前赢得状态写时，取消方只按 `PENDING` 分支释放过
    /// 预留，而本方已把预留转成售出，必须在这里退回，否则容量永久丢失。
    async fn mark_paid(&self, order: &Order, payment_reference: &str) -> Result<Order, OrderError> {
        let reference = payment_reference.to_string();
        let result = self
            .update_order(&order.id, |current| match current.status {
                OrderStatus::Paid => Ok(None),
                OrderStatus::Pending => {
                    let mut updated = current.clone();
                    updated.status = OrderStatus::Paid;
                    updated.paid_at = Some(now_millis());
                    updated.payment_reference = Some(reference.clone());
                    Ok(Some(updated))
                }
                from => Err(OrderError::InvalidTransition {
                    from,
                    to: OrderStatus::Paid,
                }),
            })
            .await;

        match result {
            Ok(paid) => Ok(paid),
            Err(e @ OrderError::InvalidTransition { .. }) => {
                for item in &order.items {
                    let _ = self
                        .ledger
                        .return_sold(&item.ticket_type_id, item.quantity)
                        .await;
                }
                let _ = self.ledger.release_all_for_order(&order.id).await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// 把订单每一行的预留转为售出，失败时尽力回滚
    async fn commit_lines(&self, order: &Order) -> Result<(), OrderError> {
        let mut committed: Vec<(String, u32)> = Vec::new();
        for item in &order.items {
            match self.ledger.commit(&order.id, &item.ticket_type_id).await {
                Ok(()) => committed.push((item.ticket_type_id.clone(), item.quantity)),
                Err(e) => {
                    for (ticket_type_id, quantity) in committed {
                        let _ = self.ledger.return_sold(&ticket_type_id, quantity).await;
                    }
                    let _ = self.ledger.release_all_for_order(&order.id).await;
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// 优惠码用量 +1，按 orderId 幂等
    async fn consume_promo(&self, order: &Order) -> Result<(), OrderError> {
        let Some(promo_id) = &order.promo_code_id else {
            return Ok(());
        };
        if !self
            .store
            .record_promo_consumption(promo_id, &order.id, &order.customer_email)?
        {
            return Ok(());
        }

        let mut attempt = 0;
        loop {
            let Some((version, mut promo)) = self
                .store
                .get_versioned::<PromoCode>(PROMO_CODES, promo_id)?
            else {
                // 码已被删除，无处计数
                return Ok(());
            };
            promo.current_uses += 1;
            if self
                .store
                .put_if_version(PROMO_CODES, promo_id, version, &promo)?
            {
                return Ok(());
            }
            attempt += 1;
            if attempt > self.retry.max_retries {
                return Err(OrderError::Conflict(promo_id.clone()));
            }
            tokio::time::sleep(self.retry.delay(attempt)).await;
        }
    }
}
