//! 结账
//!
//! 一次结账要么产出一个完整定价、库存已占位的 `PENDING` 订单，
//! 要么什么都不留下：任何一行预留失败、优惠码校验失败或定价失败
//! 都会释放此前已占位的全部预留。
//!
//! 金额恒等式: `total = subtotal - discount + fees + tax`，
//! 各项先单独归一到分再参与求和。

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use shared::models::{EventSettings, Fee, Order, OrderFeeLine, OrderItem, OrderStatus, TicketType};
use shared::util::{now_millis, record_id};

use crate::db::{EVENT_SETTINGS, FEES, ORDERS, ORDER_NUMBER_IDX, TICKET_TYPES};
use crate::pricing::promo::{applies_to_ticket_type, applicable_subtotal, calculate_discount};
use crate::pricing::{PromoCartLine, compute_fees, round2, to_decimal, to_f64};

use super::{OrderError, OrderService, numbers};

/// 结账请求的一行
#[derive(Debug, Clone)]
pub struct CheckoutLine {
    pub ticket_type_id: String,
    pub quantity: u32,
}

/// 结账请求
#[derive(Debug, Clone)]
pub struct CheckoutInput {
    pub event_id: String,
    pub items: Vec<CheckoutLine>,
    pub customer_name: String,
    pub customer_email: String,
    pub promo_code: Option<String>,
}

impl OrderService {
    /// 结账：校验、全有或全无预留、定价、持久化 `PENDING` 订单
    pub async fn checkout(&self, input: CheckoutInput) -> Result<Order, OrderError> {
        let lines = self.validate_cart(&input)?;
        let order_id = record_id();

        // 逐行预留，任何一行失败都回滚整单
        for (line, _) in &lines {
            if let Err(e) = self
                .ledger
                .reserve(&order_id, &line.ticket_type_id, line.quantity)
                .await
            {
                self.ledger.release_all_for_order(&order_id).await?;
                return Err(e.into());
            }
        }

        // 预留之后的失败（优惠码、定价、持久化）同样回滚
        match self.price_and_persist(&input, &order_id, &lines) {
            Ok(order) => {
                tracing::info!(
                    order_number = %order.order_number,
                    event_id = %order.event_id,
                    total = order.total,
                    "Checkout completed"
                );
                Ok(order)
            }
            Err(e) => {
                self.ledger.release_all_for_order(&order_id).await?;
                Err(e)
            }
        }
    }

    /// 结构校验 + 票种校验（在售窗口、单笔数量边界）
    fn validate_cart(
        &self,
        input: &CheckoutInput,
    ) -> Result<Vec<(CheckoutLine, TicketType)>, OrderError> {
        if input.items.is_empty() {
            return Err(OrderError::Validation(
                "Order must contain at least one ticket".to_string(),
            ));
        }
        if input.customer_email.trim().is_empty() {
            return Err(OrderError::Validation(
                "Customer email is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let now = now_millis();
        let mut lines = Vec::with_capacity(input.items.len());

        for line in &input.items {
            if !seen.insert(line.ticket_type_id.clone()) {
                return Err(OrderError::Validation(format!(
                    "Duplicate ticket type in order: {}",
                    line.ticket_type_id
                )));
            }

            let ticket_type: TicketType = self
                .store
                .get(TICKET_TYPES, &line.ticket_type_id)?
                .ok_or_else(|| OrderError::NotFound(line.ticket_type_id.clone()))?;

            if ticket_type.event_id != input.event_id {
                return Err(OrderError::Validation(format!(
                    "Ticket type {} does not belong to event {}",
                    ticket_type.id, input.event_id
                )));
            }
            if !ticket_type.on_sale(now) {
                return Err(OrderError::Validation(format!(
                    "Ticket type {} is not on sale",
                    ticket_type.name
                )));
            }
            if line.quantity < ticket_type.min_per_order {
                return Err(OrderError::Validation(format!(
                    "Minimum {} tickets per order for {}",
                    ticket_type.min_per_order, ticket_type.name
                )));
            }
            if let Some(max) = ticket_type.max_per_order
                && line.quantity > max
            {
                return Err(OrderError::Validation(format!(
                    "Maximum {} tickets per order for {}",
                    max, ticket_type.name
                )));
            }

            lines.push((line.clone(), ticket_type));
        }
        Ok(lines)
    }

    /// 定价并持久化订单（预留已就位）
    fn price_and_persist(
        &self,
        input: &CheckoutInput,
        order_id: &str,
        lines: &[(CheckoutLine, TicketType)],
    ) -> Result<Order, OrderError> {
        let cart: Vec<PromoCartLine> = lines
            .iter()
            .map(|(line, ticket_type)| PromoCartLine {
                ticket_type_id: ticket_type.id.clone(),
                quantity: line.quantity,
                unit_price: ticket_type.price,
            })
            .collect();

        // 优惠码：校验失败即结账失败，带具体原因
        let mut promo_applied = None;
        let mut discount = Decimal::ZERO;
        let mut line_discounts: HashMap<String, Decimal> = HashMap::new();

        if let Some(code) = input.promo_code.as_deref().filter(|c| !c.trim().is_empty()) {
            let promo = self
                .promos
                .validate_for_cart(code, &cart, &input.customer_email)?;
            let base = applicable_subtotal(&promo, &cart);
            discount = calculate_discount(&promo, base);
            line_discounts = allocate_discount(&cart, &promo, discount, base);
            promo_applied = Some(promo);
        }

        // 行项目与金额
        let items: Vec<OrderItem> = lines
            .iter()
            .map(|(line, ticket_type)| {
                let line_subtotal =
                    round2(to_decimal(ticket_type.price) * Decimal::from(line.quantity));
                let line_discount = line_discounts
                    .get(&ticket_type.id)
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                OrderItem {
                    ticket_type_id: ticket_type.id.clone(),
                    ticket_type_name: ticket_type.name.clone(),
                    quantity: line.quantity,
                    unit_price: ticket_type.price,
                    discount: to_f64(line_discount),
                    subtotal: to_f64(line_subtotal),
                    total: to_f64(line_subtotal - line_discount),
                }
            })
            .collect();

        let subtotal: Decimal = items.iter().map(|i| to_decimal(i.subtotal)).sum();
        let discounted = subtotal - discount;
        let ticket_count: u32 = items.iter().map(|i| i.quantity).sum();

        let rules: Vec<Fee> = self.store.scan(FEES)?;
        let fee_breakdown = compute_fees(&rules, discounted, ticket_count);
        let fees_total = to_decimal(fee_breakdown.total);

        let settings: Option<EventSettings> = self.store.get(EVENT_SETTINGS, &input.event_id)?;
        let (tax_rate, tax_on_fees, currency) = match settings {
            Some(s) => (s.tax_rate_percent, s.tax_on_fees, s.currency),
            None => (0.0, false, "EUR".to_string()),
        };
        let tax_base = if tax_on_fees {
            discounted + fees_total
        } else {
            discounted
        };
        let tax = round2(tax_base * to_decimal(tax_rate) / Decimal::ONE_HUNDRED);
        let total = round2(discounted + fees_total + tax);

        let order = Order {
            id: order_id.to_string(),
            order_number: numbers::allocate_order_number(&self.store)?,
            event_id: input.event_id.clone(),
            status: OrderStatus::Pending,
            items,
            subtotal: to_f64(subtotal),
            discount: to_f64(discount),
            fees: fee_breakdown.total,
            fee_lines: fee_breakdown
                .customer_lines()
                .map(|line| OrderFeeLine {
                    fee_id: line.fee_id.clone(),
                    name: line.name.clone(),
                    amount: line.amount,
                })
                .collect(),
            tax: to_f64(tax),
            total: to_f64(total),
            currency,
            customer_name: input.customer_name.clone(),
            customer_email: input.customer_email.clone(),
            promo_code_id: promo_applied.as_ref().map(|p| p.id.clone()),
            promo_code: promo_applied.as_ref().map(|p| p.normalized_code()),
            payment_reference: None,
            error_note: None,
            created_at: now_millis(),
            paid_at: None,
            cancelled_at: None,
            refunded_at: None,
        };

        if !self.store.insert_with_index(
            ORDERS,
            &order.id,
            &order,
            ORDER_NUMBER_IDX,
            &order.order_number,
        )? {
            return Err(OrderError::Conflict(order.id));
        }
        Ok(order)
    }
}

/// 把订单级折扣按行小计比例分摊到适用行
///
/// 末行取余数，保证分摊之和恰好等于折扣总额。
fn allocate_discount(
    cart: &[PromoCartLine],
    promo: &shared::models::PromoCode,
    discount: Decimal,
    base: Decimal,
) -> HashMap<String, Decimal> {
    let mut shares = HashMap::new();
    if discount <= Decimal::ZERO || base <= Decimal::ZERO {
        return shares;
    }

    let applicable: Vec<&PromoCartLine> = cart
        .iter()
        .filter(|line| applies_to_ticket_type(promo, &line.ticket_type_id))
        .collect();

    let mut remaining = discount;
    for (i, line) in applicable.iter().enumerate() {
        let line_subtotal = to_decimal(line.unit_price) * Decimal::from(line.quantity);
        let share = if i + 1 == applicable.len() {
            remaining
        } else {
            round2(discount * line_subtotal / base).min(remaining)
        };
        shares.insert(line.ticket_type_id.clone(), share);
        remaining -= share;
    }
    shares
}

#[cfg(test)]
mod tests {
    use super::super::testkit;
    use super::*;
    use crate::inventory::LedgerError;
    use crate::pricing::PromoError;

    #[tokio::test]
    async fn test_checkout_happy_path() {
        let fixture = testkit::fixture();
        testkit::seed_ticket_type(&fixture.store, "tt-ga", 25.0, 100);
        testkit::seed_ticket_type(&fixture.store, "tt-vip", 80.0, 10);

        let order = fixture
            .orders
            .checkout(testkit::input(
                "ev-1",
                &[("tt-ga", 2), ("tt-vip", 1)],
                None,
            ))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.subtotal, 130.0);
        assert_eq!(order.discount, 0.0);
        assert_eq!(order.total, 130.0);
        assert!(order.order_number.starts_with("ORD-"));

        // Inventory is held
        let avail = fixture.ledger.availability("tt-ga").unwrap();
        assert_eq!(avail.reserved, 2);
    }

    #[tokio::test]
    async fn test_checkout_total_identity_with_all_parts() {
        let fixture = testkit::fixture();
        testkit::seed_ticket_type(&fixture.store, "tt-ga", 50.0, 100);
        testkit::seed_percentage_fee(&fixture.store, "Service", 10.0, 0);
        testkit::seed_event_settings(&fixture.store, "ev-1", 21.0, false);
        testkit::seed_promo(&fixture.store, "SAVE10", 10.0);

        let order = fixture
            .orders
            .checkout(testkit::input("ev-1", &[("tt-ga", 2)], Some("save10")))
            .await
            .unwrap();

        // subtotal 100, discount 10, fees 10% of 90 = 9, tax 21% of 90 = 18.90
        assert_eq!(order.subtotal, 100.0);
        assert_eq!(order.discount, 10.0);
        assert_eq!(order.fees, 9.0);
        assert_eq!(order.tax, 18.9);
        assert_eq!(order.total, 117.9);
        assert_eq!(
            order.total,
            order.subtotal - order.discount + order.fees + order.tax
        );
        assert_eq!(order.promo_code.as_deref(), Some("SAVE10"));
    }

    #[tokio::test]
    async fn test_hidden_fee_in_total_but_not_itemized() {
        let fixture = testkit::fixture();
        testkit::seed_ticket_type(&fixture.store, "tt-ga", 50.0, 100);
        testkit::seed_percentage_fee(&fixture.store, "Service", 10.0, 0);
        testkit::seed_fixed_fee(&fixture.store, "Platform", 2.5, false);

        let order = fixture
            .orders
            .checkout(testkit::input("ev-1", &[("tt-ga", 1)], None))
            .await
            .unwrap();

        // Both fees count towards the totals
        assert_eq!(order.fees, 7.5);
        assert_eq!(order.total, 57.5);
        // Only the visible fee is itemized on the order
        assert_eq!(order.fee_lines.len(), 1);
        assert_eq!(order.fee_lines[0].name, "Service");
        assert_eq!(order.fee_lines[0].amount, 5.0);
    }

    #[tokio::test]
    async fn test_checkout_insufficient_rolls_back_all_lines() {
        let fixture = testkit::fixture();
        testkit::seed_ticket_type(&fixture.store, "tt-ga", 25.0, 100);
        testkit::seed_ticket_type(&fixture.store, "tt-vip", 80.0, 2);

        let err = fixture
            .orders
            .checkout(testkit::input("ev-1", &[("tt-ga", 4), ("tt-vip", 3)], None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::Ledger(LedgerError::Insufficient { .. })
        ));

        // The GA reservation from the failed order was released
        assert_eq!(fixture.ledger.availability("tt-ga").unwrap().reserved, 0);
        assert_eq!(fixture.ledger.availability("tt-vip").unwrap().reserved, 0);
    }

    #[tokio::test]
    async fn test_checkout_invalid_promo_rolls_back() {
        let fixture = testkit::fixture();
        testkit::seed_ticket_type(&fixture.store, "tt-ga", 25.0, 100);

        let err = fixture
            .orders
            .checkout(testkit::input("ev-1", &[("tt-ga", 2)], Some("NOPE")))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Promo(PromoError::NotFound)));
        assert_eq!(fixture.ledger.availability("tt-ga").unwrap().reserved, 0);
    }

    #[tokio::test]
    async fn test_checkout_quantity_bounds() {
        let fixture = testkit::fixture();
        let mut tt = testkit::ticket_type("tt-ga", 25.0, 100);
        tt.min_per_order = 2;
        tt.max_per_order = Some(4);
        fixture
            .store
            .insert_new(crate::db::TICKET_TYPES, &tt.id, &tt)
            .unwrap();

        let too_few = fixture
            .orders
            .checkout(testkit::input("ev-1", &[("tt-ga", 1)], None))
            .await;
        assert!(matches!(too_few, Err(OrderError::Validation(_))));

        let too_many = fixture
            .orders
            .checkout(testkit::input("ev-1", &[("tt-ga", 5)], None))
            .await;
        assert!(matches!(too_many, Err(OrderError::Validation(_))));

        assert!(
            fixture
                .orders
                .checkout(testkit::input("ev-1", &[("tt-ga", 3)], None))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_checkout_rejects_off_sale_and_empty() {
        let fixture = testkit::fixture();
        let mut tt = testkit::ticket_type("tt-ga", 25.0, 100);
        tt.active = false;
        fixture
            .store
            .insert_new(crate::db::TICKET_TYPES, &tt.id, &tt)
            .unwrap();

        let off_sale = fixture
            .orders
            .checkout(testkit::input("ev-1", &[("tt-ga", 1)], None))
            .await;
        assert!(matches!(off_sale, Err(OrderError::Validation(_))));

        let empty = fixture.orders.checkout(testkit::input("ev-1", &[], None)).await;
        assert!(matches!(empty, Err(OrderError::Validation(_))));
    }

    #[tokio::test]
    async fn test_discount_allocation_sums_to_total() {
        let fixture = testkit::fixture();
        testkit::seed_ticket_type(&fixture.store, "tt-a", 10.0, 100);
        testkit::seed_ticket_type(&fixture.store, "tt-b", 20.0, 100);
        testkit::seed_ticket_type(&fixture.store, "tt-c", 35.0, 100);
        // 33.33% off an awkward subtotal forces rounding in the shares
        testkit::seed_promo(&fixture.store, "THIRD", 33.33);

        let order = fixture
            .orders
            .checkout(testkit::input(
                "ev-1",
                &[("tt-a", 1), ("tt-b", 1), ("tt-c", 1)],
                Some("THIRD"),
            ))
            .await
            .unwrap();

        let allocated: f64 = order.items.iter().map(|i| i.discount).sum();
        assert!((allocated - order.discount).abs() < 1e-9);
        assert_eq!(
            order.total,
            order.subtotal - order.discount + order.fees + order.tax
        );
    }
}
