//! 顾客通知
//!
//! 通知是尽力而为的旁路动作：投递失败只记日志，从不影响订单或
//! 退款流程的结果。生产部署把 [`Notifier`] 接到邮件网关，
//! 默认实现只写结构化日志。

use async_trait::async_trait;
use shared::models::{Order, Ticket};

/// 通知出口
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 支付成功、门票签发后
    async fn tickets_issued(&self, order: &Order, tickets: &[Ticket]);

    /// 单笔退款完成后
    async fn refund_processed(&self, order: &Order, amount: f64);
}

/// 日志通知器 (默认实现)
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn tickets_issued(&self, order: &Order, tickets: &[Ticket]) {
        tracing::info!(
            order_number = %order.order_number,
            customer = %order.customer_email,
            tickets = tickets.len(),
            "Notification: tickets issued"
        );
    }

    async fn refund_processed(&self, order: &Order, amount: f64) {
        tracing::info!(
            order_number = %order.order_number,
            customer = %order.customer_email,
            amount,
            "Notification: refund processed"
        );
    }
}
