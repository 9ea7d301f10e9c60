//! Event Settings Model
//!
//! Events themselves live in an external system; the commerce core only
//! needs the per-event billing configuration referenced at checkout.

use serde::{Deserialize, Serialize};

/// 活动计费配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventSettings {
    /// External event id.
    pub event_id: String,
    pub organizer_id: String,
    /// Tax rate in percent (e.g. 21 for 21% VAT).
    #[serde(default)]
    pub tax_rate_percent: f64,
    /// Tax base selection: true = tax applies to the fee-inclusive
    /// base (`subtotal - discount + fees`), false = fee-exclusive
    /// (`subtotal - discount`).
    #[serde(default)]
    pub tax_on_fees: bool,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub created_at: i64,
}

fn default_currency() -> String {
    "EUR".to_string()
}
