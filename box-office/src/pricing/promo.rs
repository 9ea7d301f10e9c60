//! 优惠码校验与折扣计算
//!
//! 校验失败必须给出具体原因（过期、用尽、不适用……），而不是一句
//! 笼统的 "invalid code"。折扣金额始终被钳制在
//! `[0, 适用小计]` 区间内，订单金额不会因此为负。
//!
//! 用量递增不在这里发生：`current_uses` 只在支付确认时按 orderId
//! 幂等地加一（见订单模块）。

use rust_decimal::Decimal;
use thiserror::Error;

use shared::models::{PromoCode, PromoDiscountType, promo_code::normalize_code};
use shared::util::now_millis;

use crate::db::{PROMO_CODES, PROMO_CODE_IDX, Store, StorageError};

use super::money::{round2, to_decimal};

/// 校验失败原因
#[derive(Debug, Error)]
pub enum PromoError {
    #[error("Promo code not found")]
    NotFound,

    #[error("Promo code is not active")]
    NotActive,

    #[error("Promo code is not valid yet")]
    NotYetValid,

    #[error("Promo code has expired")]
    Expired,

    #[error("Promo code usage limit reached")]
    MaxUsesReached,

    #[error("Promo code usage limit reached for this customer")]
    UserLimitReached,

    #[error("Promo code does not apply to any ticket in this order")]
    NotApplicable,

    #[error("Promo code requires at least {required} applicable tickets, order has {actual}")]
    BelowMinTickets { required: u32, actual: u32 },

    #[error("Promo code requires a minimum purchase of {required:.2}")]
    BelowMinPurchase { required: f64 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<PromoError> for crate::utils::AppError {
    fn from(e: PromoError) -> Self {
        match e {
            PromoError::Storage(inner) => inner.into(),
            other => crate::utils::AppError::InvalidPromoCode(other.to_string()),
        }
    }
}

/// 参与优惠码校验的购物车行
#[derive(Debug, Clone)]
pub struct PromoCartLine {
    pub ticket_type_id: String,
    pub quantity: u32,
    pub unit_price: f64,
}

/// 优惠码是否覆盖某个票种
pub fn applies_to_ticket_type(promo: &PromoCode, ticket_type_id: &str) -> bool {
    promo.applicable_ticket_types.is_empty()
        || promo
            .applicable_ticket_types
            .iter()
            .any(|id| id == ticket_type_id)
}

/// 购物车中适用于该码的部分
fn applicable_lines<'a>(promo: &PromoCode, cart: &'a [PromoCartLine]) -> Vec<&'a PromoCartLine> {
    cart.iter()
        .filter(|line| applies_to_ticket_type(promo, &line.ticket_type_id))
        .collect()
}

/// 适用部分的小计（折扣基数）
pub fn applicable_subtotal(promo: &PromoCode, cart: &[PromoCartLine]) -> Decimal {
    applicable_lines(promo, cart)
        .iter()
        .map(|line| to_decimal(line.unit_price) * Decimal::from(line.quantity))
        .sum()
}

/// 校验优惠码是否适用于给定购物车
///
/// `user_uses` 为该顾客已成功使用该码的次数，由调用方从消费记录查出。
/// 检查顺序固定，返回第一个命中的失败原因。
pub fn validate(
    promo: &PromoCode,
    cart: &[PromoCartLine],
    user_uses: u32,
    now: i64,
) -> Result<(), PromoError> {
    if !promo.active {
        return Err(PromoError::NotActive);
    }
    if let Some(from) = promo.valid_from
        && now < from
    {
        return Err(PromoError::NotYetValid);
    }
    if let Some(until) = promo.valid_until
        && now > until
    {
        return Err(PromoError::Expired);
    }
    if let Some(max) = promo.max_uses
        && promo.current_uses >= max
    {
        return Err(PromoError::MaxUsesReached);
    }
    if let Some(max) = promo.max_uses_per_user
        && user_uses >= max
    {
        return Err(PromoError::UserLimitReached);
    }

    let lines = applicable_lines(promo, cart);
    if lines.is_empty() {
        return Err(PromoError::NotApplicable);
    }

    let ticket_count: u32 = lines.iter().map(|line| line.quantity).sum();
    if ticket_count < promo.min_tickets {
        return Err(PromoError::BelowMinTickets {
            required: promo.min_tickets,
            actual: ticket_count,
        });
    }

    let subtotal = applicable_subtotal(promo, cart);
    if subtotal < to_decimal(promo.min_purchase_amount) {
        return Err(PromoError::BelowMinPurchase {
            required: promo.min_purchase_amount,
        });
    }

    Ok(())
}

/// 计算折扣金额，钳制在 `[0, base]`
pub fn calculate_discount(promo: &PromoCode, base: Decimal) -> Decimal {
    let raw = match promo.discount_type {
        PromoDiscountType::Percentage => base * to_decimal(promo.discount_amount) / Decimal::ONE_HUNDRED,
        PromoDiscountType::Fixed => to_decimal(promo.discount_amount),
    };
    round2(raw.clamp(Decimal::ZERO, base))
}

/// 绑定存储的优惠码校验器
///
/// 负责按码查找记录、查询顾客历史用量，再转交纯函数校验。
pub struct PromoValidator {
    store: Store,
}

impl PromoValidator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// 按码（大小写不敏感）查找优惠码记录
    pub fn lookup(&self, code: &str) -> Result<PromoCode, PromoError> {
        let normalized = normalize_code(code);
        let id = self
            .store
            .get_index(PROMO_CODE_IDX, &normalized)?
            .ok_or(PromoError::NotFound)?;
        self.store
            .get(PROMO_CODES, &id)?
            .ok_or(PromoError::NotFound)
    }

    /// 完整校验：查找、查用户用量、规则检查
    ///
    /// 成功时返回记录本身，供调用方计算折扣。
    pub fn validate_for_cart(
        &self,
        code: &str,
        cart: &[PromoCartLine],
        customer_email: &str,
    ) -> Result<PromoCode, PromoError> {
        let promo = self.lookup(code)?;
        let user_uses = self.store.promo_uses_by_user(&promo.id, customer_email)?;
        validate(&promo, cart, user_uses, now_millis())?;
        Ok(promo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::money::to_f64;

    fn promo() -> PromoCode {
        PromoCode {
            id: "pc-1".to_string(),
            event_id: "ev-1".to_string(),
            code: "SAVE10".to_string(),
            discount_type: PromoDiscountType::Percentage,
            discount_amount: 10.0,
            valid_from: None,
            valid_until: None,
            max_uses: None,
            max_uses_per_user: None,
            current_uses: 0,
            applicable_ticket_types: vec![],
            min_tickets: 0,
            min_purchase_amount: 0.0,
            active: true,
            created_at: 0,
        }
    }

    fn cart() -> Vec<PromoCartLine> {
        vec![
            PromoCartLine {
                ticket_type_id: "tt-ga".to_string(),
                quantity: 2,
                unit_price: 25.0,
            },
            PromoCartLine {
                ticket_type_id: "tt-vip".to_string(),
                quantity: 1,
                unit_price: 100.0,
            },
        ]
    }

    #[test]
    fn test_valid_code_passes() {
        assert!(validate(&promo(), &cart(), 0, 1_000).is_ok());
    }

    #[test]
    fn test_inactive_code() {
        let mut p = promo();
        p.active = false;
        assert!(matches!(
            validate(&p, &cart(), 0, 1_000),
            Err(PromoError::NotActive)
        ));
    }

    #[test]
    fn test_validity_window() {
        let mut p = promo();
        p.valid_from = Some(2_000);
        p.valid_until = Some(3_000);

        assert!(matches!(
            validate(&p, &cart(), 0, 1_000),
            Err(PromoError::NotYetValid)
        ));
        assert!(validate(&p, &cart(), 0, 2_500).is_ok());
        assert!(matches!(
            validate(&p, &cart(), 0, 4_000),
            Err(PromoError::Expired)
        ));
    }

    #[test]
    fn test_max_uses_boundary() {
        let mut p = promo();
        p.max_uses = Some(5);
        p.current_uses = 4;
        assert!(validate(&p, &cart(), 0, 1_000).is_ok());

        p.current_uses = 5;
        assert!(matches!(
            validate(&p, &cart(), 0, 1_000),
            Err(PromoError::MaxUsesReached)
        ));
    }

    #[test]
    fn test_per_user_limit() {
        let mut p = promo();
        p.max_uses_per_user = Some(2);
        assert!(validate(&p, &cart(), 1, 1_000).is_ok());
        assert!(matches!(
            validate(&p, &cart(), 2, 1_000),
            Err(PromoError::UserLimitReached)
        ));
    }

    #[test]
    fn test_not_applicable_to_cart() {
        let mut p = promo();
        p.applicable_ticket_types = vec!["tt-student".to_string()];
        assert!(matches!(
            validate(&p, &cart(), 0, 1_000),
            Err(PromoError::NotApplicable)
        ));
    }

    #[test]
    fn test_min_tickets_counts_applicable_only() {
        let mut p = promo();
        p.applicable_ticket_types = vec!["tt-ga".to_string()];
        p.min_tickets = 3;
        // Cart has 3 tickets but only 2 are GA
        let err = validate(&p, &cart(), 0, 1_000).unwrap_err();
        assert!(matches!(
            err,
            PromoError::BelowMinTickets {
                required: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_min_purchase_amount() {
        let mut p = promo();
        p.min_purchase_amount = 200.0;
        assert!(matches!(
            validate(&p, &cart(), 0, 1_000),
            Err(PromoError::BelowMinPurchase { .. })
        ));

        p.min_purchase_amount = 150.0; // cart subtotal is exactly 150
        assert!(validate(&p, &cart(), 0, 1_000).is_ok());
    }

    #[test]
    fn test_percentage_discount() {
        let p = promo();
        let base = applicable_subtotal(&p, &cart());
        assert_eq!(to_f64(calculate_discount(&p, base)), 15.0);
    }

    #[test]
    fn test_fixed_discount_clamped_to_base() {
        let mut p = promo();
        p.discount_type = PromoDiscountType::Fixed;
        p.discount_amount = 500.0;
        // Base is 150, discount cannot exceed it
        assert_eq!(to_f64(calculate_discount(&p, to_decimal(150.0))), 150.0);
    }

    #[test]
    fn test_negative_discount_clamped_to_zero() {
        let mut p = promo();
        p.discount_amount = -10.0;
        assert_eq!(to_f64(calculate_discount(&p, to_decimal(100.0))), 0.0);
    }

    #[test]
    fn test_discount_base_is_applicable_subtotal() {
        let mut p = promo();
        p.applicable_ticket_types = vec!["tt-vip".to_string()];
        let base = applicable_subtotal(&p, &cart());
        assert_eq!(to_f64(base), 100.0);
        assert_eq!(to_f64(calculate_discount(&p, base)), 10.0);
    }

    #[test]
    fn test_validator_lookup_is_case_insensitive() {
        let store = Store::open_in_memory().unwrap();
        let p = promo();
        store
            .insert_with_index(PROMO_CODES, &p.id, &p, PROMO_CODE_IDX, &p.normalized_code())
            .unwrap();

        let validator = PromoValidator::new(store);
        assert_eq!(validator.lookup("save10").unwrap().id, "pc-1");
        assert!(matches!(
            validator.lookup("NOPE"),
            Err(PromoError::NotFound)
        ));
    }
}
