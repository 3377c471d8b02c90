//! Value Objects for order bookkeeping

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minor-unit precision used for every monetary comparison.
pub const MONEY_SCALE: u32 = 2;

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self {
        Self { amount, currency: currency.to_uppercase() }
    }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn is_positive(&self) -> bool { self.rounded() > Decimal::ZERO }

    /// Amount rounded half-away-from-zero to [`MONEY_SCALE`] places.
    pub fn rounded(&self) -> Decimal {
        round_amount(self.amount)
    }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_currency(other)?;
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }

    pub fn subtract(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_currency(other)?;
        Ok(Money::new(self.amount - other.amount, &self.currency))
    }

    /// Equality after rounding both sides, the comparison refunds use.
    pub fn same_amount(&self, other: &Money) -> bool {
        self.currency == other.currency && self.rounded() == other.rounded()
    }

    fn ensure_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch { left: self.currency.clone(), right: other.currency.clone() });
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {}", self.rounded(), self.currency) }
}

pub fn round_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_add() {
        let a = Money::new(Decimal::new(100, 0), "vnd");
        let b = Money::new(Decimal::new(50, 0), "VND");
        assert_eq!(a.add(&b).unwrap().amount(), Decimal::new(150, 0));
    }

    #[test]
    fn test_currency_mismatch() {
        let a = Money::new(Decimal::ONE, "USD");
        let b = Money::new(Decimal::ONE, "VND");
        assert!(matches!(a.subtract(&b), Err(MoneyError::CurrencyMismatch { .. })));
    }

    #[test]
    fn test_same_amount_ignores_sub_cent_noise() {
        let a = Money::new(Decimal::new(199_999, 3), "USD"); // 199.999
        let b = Money::new(Decimal::new(20_000, 2), "USD"); // 200.00
        assert!(a.same_amount(&b));
        let c = Money::new(Decimal::new(19_998, 2), "USD");
        assert!(!c.same_amount(&b));
    }
}
