//! 费用规则引擎
//!
//! 按 `display_order` 顺序逐条计算订单费用。规则之间互不影响：
//! 百分比费用的基数始终是折后小计，而不是累加了前面费用的金额。
//!
//! 隐藏费用 (`display_to_customer = false`) 计入费用总额，但被
//! [`FeeBreakdown::customer_lines`] 过滤掉，不出现在顾客明细里。

use rust_decimal::Decimal;
use shared::models::{Fee, FeeCalculation};

use super::money::{round2, to_decimal, to_f64};

/// 单条费用明细
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FeeLine {
    pub fee_id: String,
    pub name: String,
    pub amount: f64,
    pub display_to_customer: bool,
}

/// 一次订单的费用计算结果
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FeeBreakdown {
    /// 全部费用行（含隐藏费用），按 display_order 排序
    pub lines: Vec<FeeLine>,
    /// 费用总额（含隐藏费用）
    pub total: f64,
}

impl FeeBreakdown {
    /// 顾客可见的费用行
    pub fn customer_lines(&self) -> impl Iterator<Item = &FeeLine> {
        self.lines.iter().filter(|line| line.display_to_customer)
    }
}

/// 计算一组费用规则在给定订单上的金额
///
/// - `discounted_subtotal`: 折后小计（百分比费用的基数）
/// - `ticket_count`: 订单总票数（按票费用的乘数）
///
/// 非激活规则被跳过。每行金额单独四舍五入到分后再求和。
pub fn compute_fees(rules: &[Fee], discounted_subtotal: Decimal, ticket_count: u32) -> FeeBreakdown {
    let mut active: Vec<&Fee> = rules.iter().filter(|rule| rule.active).collect();
    active.sort_by(|a, b| {
        a.display_order
            .cmp(&b.display_order)
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut lines = Vec::with_capacity(active.len());
    let mut total = Decimal::ZERO;

    for rule in active {
        let raw = match rule.calculation_type {
            FeeCalculation::Percentage => {
                discounted_subtotal * to_decimal(rule.amount) / Decimal::ONE_HUNDRED
            }
            FeeCalculation::Fixed => to_decimal(rule.amount),
            FeeCalculation::PerTicket => to_decimal(rule.amount) * Decimal::from(ticket_count),
        };
        let amount = round2(raw.max(Decimal::ZERO));
        total += amount;

        lines.push(FeeLine {
            fee_id: rule.id.clone(),
            name: rule.name.clone(),
            amount: to_f64(amount),
            display_to_customer: rule.display_to_customer,
        });
    }

    FeeBreakdown {
        lines,
        total: to_f64(total),
    }
}
