//! Ticket Model

use serde::{Deserialize, Serialize};

/// 门票状态
///
/// 状态机: `VALID -> USED`, `VALID -> CANCELLED`,
/// `VALID|USED -> REFUNDED`。`USED` 之后只能转向 `REFUNDED`。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    #[default]
    Valid,
    Used,
    Cancelled,
    Refunded,
}

impl TicketStatus {
    /// Exhaustive transition table for the ticket state machine.
    pub fn can_transition(self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (Valid, Used) | (Valid, Cancelled) | (Valid, Refunded) | (Used, Refunded)
        )
    }
}

/// 门票 - 每个已购入场单位一张
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub id: String,
    pub order_id: String,
    pub ticket_type_id: String,
    pub event_id: String,
    /// Globally unique human-legible code, `XXXX-XXXX-XXXX` from an
    /// unambiguous alphabet.
    pub code: String,
    /// Tamper-evident QR payload: code + ticket id + issuance time +
    /// digest. Stored as the exact string encoded into the QR image.
    pub qr_payload: String,
    pub status: TicketStatus,
    pub attendee_name: String,
    pub attendee_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat_info: Option<String>,
    pub issued_at: i64,
    /// Check-in audit fields, set exactly once on the VALID -> USED
    /// transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_location: Option<String>,
}
