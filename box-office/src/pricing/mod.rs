//! 定价模块 - 金额运算、费用规则、优惠码
//!
//! 所有金额运算使用 [`rust_decimal::Decimal`]，只在持久化边界转回
//! `f64`。舍入统一为 2 位小数、远离零的四舍五入。

pub mod fees;
pub mod money;
pub mod promo;

pub use fees::{FeeBreakdown, FeeLine, compute_fees};
pub use money::{round2, to_decimal, to_f64};
pub use promo::{PromoCartLine, PromoError, PromoValidator};
