//! 金额运算辅助
//!
//! 存储层金额为 `f64`（JSON 持久化），运算层统一转成 `Decimal`，
//! 避免浮点累积误差。对外输出前用 [`round2`] 归一到分。

use rust_decimal::Decimal;
use rust_decimal::prelude::*;

/// f64 -> Decimal，非法值（NaN / Inf）按 0 处理
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

/// Decimal -> f64（持久化边界）
pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// 四舍五入到 2 位小数（远离零）
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2_midpoint_away_from_zero() {
        assert_eq!(to_f64(round2(to_decimal(10.125))), 10.13);
        assert_eq!(to_f64(round2(to_decimal(10.124))), 10.12);
        assert_eq!(to_f64(round2(to_decimal(-10.125))), -10.13);
    }

    #[test]
    fn test_to_decimal_handles_invalid() {
        assert_eq!(to_decimal(f64::NAN), Decimal::ZERO);
        assert_eq!(to_decimal(f64::INFINITY), Decimal::ZERO);
    }

    #[test]
    fn test_decimal_accumulation_precision() {
        // 0.1 + 0.2 fails in f64, succeeds in Decimal
        let sum = to_decimal(0.1) + to_decimal(0.2);
        assert_eq!(to_f64(sum), 0.3);
    }
}
