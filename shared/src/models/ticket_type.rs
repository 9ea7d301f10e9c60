//! Ticket Type Model

use serde::{Deserialize, Serialize};

/// 票种 - 某一活动下的一类门票 (容量核算的最小单位)
///
/// 计数器约束: `sold + reserved <= capacity`，任何修改都必须经过
/// Inventory Ledger 的条件更新操作，禁止直接写计数器。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketType {
    pub id: String,
    /// 所属活动 ID (活动本身由外部系统管理)
    pub event_id: String,
    pub name: String,
    /// 单价
    pub price: f64,
    /// 总容量 (>= 1)
    pub capacity: u32,
    /// 已售出数量
    #[serde(default)]
    pub sold: u32,
    /// 已预留数量 (结账中，未付款)
    #[serde(default)]
    pub reserved: u32,
    /// 单笔订单最小购买数
    #[serde(default = "default_min_per_order")]
    pub min_per_order: u32,
    /// 单笔订单最大购买数 (None = 不限)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_per_order: Option<u32>,
    /// 开售时间 (毫秒时间戳)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales_start: Option<i64>,
    /// 停售时间 (毫秒时间戳)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales_end: Option<i64>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub created_at: i64,
}

fn default_true() -> bool {
    true
}

fn default_min_per_order() -> u32 {
    1
}

impl TicketType {
    /// Remaining purchasable units: `capacity - sold - reserved`.
    pub fn available(&self) -> u32 {
        self.capacity.saturating_sub(self.sold).saturating_sub(self.reserved)
    }

    /// Whether sales are open at `now` (millisecond timestamp).
    pub fn on_sale(&self, now: i64) -> bool {
        if !self.active {
            return false;
        }
        if let Some(start) = self.sales_start
            && now < start
        {
            return false;
        }
        if let Some(end) = self.sales_end
            && now > end
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket_type() -> TicketType {
        TicketType {
            id: "tt-1".to_string(),
            event_id: "ev-1".to_string(),
            name: "General Admission".to_string(),
            price: 25.0,
            capacity: 100,
            sold: 30,
            reserved: 10,
            min_per_order: 1,
            max_per_order: Some(8),
            sales_start: None,
            sales_end: None,
            active: true,
            created_at: 0,
        }
    }

    #[test]
    fn test_available_subtracts_sold_and_reserved() {
        assert_eq!(ticket_type().available(), 60);
    }

    #[test]
    fn test_available_never_underflows() {
        let mut tt = ticket_type();
        tt.sold = 90;
        tt.reserved = 20;
        assert_eq!(tt.available(), 0);
    }

    #[test]
    fn test_on_sale_window() {
        let mut tt = ticket_type();
        tt.sales_start = Some(1_000);
        tt.sales_end = Some(2_000);
        assert!(!tt.on_sale(500));
        assert!(tt.on_sale(1_500));
        assert!(!tt.on_sale(2_500));

        tt.active = false;
        assert!(!tt.on_sale(1_500));
    }
}
