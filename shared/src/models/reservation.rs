//! Reservation Record
//!
//! A reservation is a temporary hold on inventory created during
//! checkout, keyed by `(order_id, ticket_type_id)`. It backs the
//! stale-reservation sweep: holds older than the checkout TTL are
//! released back to available inventory.

use serde::{Deserialize, Serialize};

/// 结账预留记录 - 未付款前的临时占位
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reservation {
    pub order_id: String,
    pub ticket_type_id: String,
    pub quantity: u32,
    pub created_at: i64,
}

impl Reservation {
    /// Storage key, unique per order/ticket-type pair.
    pub fn key(order_id: &str, ticket_type_id: &str) -> String {
        format!("{}:{}", order_id, ticket_type_id)
    }
}
