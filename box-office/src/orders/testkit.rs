//! 订单测试夹具：内存存储上的完整服务栈与常用种子数据

use std::sync::Arc;

use shared::models::{EventSettings, Fee, FeeCalculation, PromoCode, PromoDiscountType, TicketType};
use shared::util::{now_millis, record_id};

use crate::core::Config;
use crate::db::{EVENT_SETTINGS, FEES, PROMO_CODES, PROMO_CODE_IDX, RetryPolicy, Store, TICKET_TYPES};
use crate::inventory::InventoryLedger;
use crate::services::LogNotifier;
use crate::tickets::TicketService;

use super::{CheckoutInput, CheckoutLine, OrderService};

pub(crate) struct Fixture {
    pub store: Store,
    pub ledger: InventoryLedger,
    pub tickets: TicketService,
    pub orders: OrderService,
}

pub(crate) fn fixture() -> Fixture {
    let store = Store::open_in_memory().unwrap();
    let mut config = Config::from_env();
    config.conflict_max_retries = 50;
    config.conflict_retry_base_ms = 1;

    let ledger = InventoryLedger::new(store.clone(), RetryPolicy::from_config(&config));
    let tickets = TicketService::new(store.clone(), &config);
    let orders = OrderService::new(
        store.clone(),
        ledger.clone(),
        tickets.clone(),
        Arc::new(LogNotifier),
        &config,
    );

    Fixture {
        store,
        ledger,
        tickets,
        orders,
    }
}

pub(crate) fn ticket_type(id: &str, price: f64, capacity: u32) -> TicketType {
    TicketType {
        id: id.to_string(),
        event_id: "ev-1".to_string(),
        name: id.to_string(),
        price,
        capacity,
        sold: 0,
        reserved: 0,
        min_per_order: 1,
        max_per_order: None,
        sales_start: None,
        sales_end: None,
        active: true,
        created_at: now_millis(),
    }
}

pub(crate) fn seed_ticket_type(store: &Store, id: &str, price: f64, capacity: u32) {
    let tt = ticket_type(id, price, capacity);
    store.insert_new(TICKET_TYPES, &tt.id, &tt).unwrap();
}

pub(crate) fn seed_percentage_fee(store: &Store, name: &str, percent: f64, display_order: i32) {
    let fee = Fee {
        id: record_id(),
        name: name.to_string(),
        calculation_type: FeeCalculation::Percentage,
        amount: percent,
        active: true,
        display_order,
        display_to_customer: true,
        created_at: now_millis(),
    };
    store.insert_new(FEES, &fee.id, &fee).unwrap();
}

pub(crate) fn seed_fixed_fee(store: &Store, name: &str, amount: f64, display_to_customer: bool) {
    let fee = Fee {
        id: record_id(),
        name: name.to_string(),
        calculation_type: FeeCalculation::Fixed,
        amount,
        active: true,
        display_order: 10,
        display_to_customer,
        created_at: now_millis(),
    };
    store.insert_new(FEES, &fee.id, &fee).unwrap();
}

pub(crate) fn seed_event_settings(store: &Store, event_id: &str, tax_rate: f64, tax_on_fees: bool) {
    let settings = EventSettings {
        event_id: event_id.to_string(),
        organizer_id: "org-1".to_string(),
        tax_rate_percent: tax_rate,
        tax_on_fees,
        currency: "EUR".to_string(),
        created_at: now_millis(),
    };
    store
        .insert_new(EVENT_SETTINGS, event_id, &settings)
        .unwrap();
}

pub(crate) fn seed_promo(store: &Store, code: &str, percent: f64) {
    let promo = PromoCode {
        id: record_id(),
        event_id: "ev-1".to_string(),
        code: code.to_string(),
        discount_type: PromoDiscountType::Percentage,
        discount_amount: percent,
        valid_from: None,
        valid_until: None,
        max_uses: None,
        max_uses_per_user: None,
        current_uses: 0,
        applicable_ticket_types: vec![],
        min_tickets: 0,
        min_purchase_amount: 0.0,
        active: true,
        created_at: now_millis(),
    };
    store
        .insert_with_index(
            PROMO_CODES,
            &promo.id,
            &promo,
            PROMO_CODE_IDX,
            &promo.normalized_code(),
        )
        .unwrap();
}

pub(crate) fn input(event_id: &str, lines: &[(&str, u32)], promo: Option<&str>) -> CheckoutInput {
    CheckoutInput {
        event_id: event_id.to_string(),
        items: lines
            .iter()
            .map(|(id, quantity)| CheckoutLine {
                ticket_type_id: id.to_string(),
                quantity: *quantity,
            })
            .collect(),
        customer_name: "Ada Lovelace".to_string(),
        customer_email: "ada@example.com".to_string(),
        promo_code: promo.map(str::to_string),
    }
}
