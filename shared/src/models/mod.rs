//! Persisted entities of the ticket-commerce core.
//!
//! Every status field is a closed enum with an explicit transition
//! check; string statuses and ad hoc comparisons are not used anywhere.

pub mod event;
pub mod fee;
pub mod order;
pub mod promo_code;
pub mod refund;
pub mod reservation;
pub mod settlement;
pub mod ticket;
pub mod ticket_type;

pub use event::EventSettings;
pub use fee::{Fee, FeeCalculation};
pub use order::{Order, OrderFeeLine, OrderItem, OrderStatus};
pub use promo_code::{PromoCode, PromoDiscountType};
pub use refund::{RefundRequest, RefundStatus, RefundType};
pub use reservation::Reservation;
pub use settlement::{SettlementRequest, SettlementStatus};
pub use ticket::{Ticket, TicketStatus};
pub use ticket_type::TicketType;
