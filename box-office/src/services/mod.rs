//! 外围服务集成

pub mod notify;

pub use notify::{LogNotifier, Notifier};
