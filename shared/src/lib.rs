//! Shared domain types for the Marquee ticket-commerce core.
//!
//! This crate holds the entities persisted by the box-office server and
//! exchanged over its API:
//!
//! - **models**: TicketType, PromoCode, Order, Ticket, RefundRequest,
//!   SettlementRequest, Fee, EventSettings
//! - **util**: timestamp and record-id helpers
//!
//! All monetary amounts are stored as `f64` rounded to two decimal
//! places; arithmetic on them happens in the server through
//! `rust_decimal` before values are written back.

pub mod models;
pub mod util;

pub use models::{
    EventSettings, Fee, FeeCalculation, Order, OrderItem, OrderStatus, PromoCode,
    PromoDiscountType, RefundRequest, RefundStatus, RefundType, Reservation, SettlementRequest,
    SettlementStatus, Ticket, TicketStatus, TicketType,
};
