use crate::error::LedgerError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Number of fractional digits carried by every amount (cents).
pub const MONEY_SCALE: u32 = 2;

/// Signed wallet balance.
///
/// System wallets such as the master liquidity float are allowed to go
/// negative, so unlike [`Amount`] this carries no sign restriction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Balance(pub Decimal);

/// Strictly positive monetary amount with at most two fractional digits.
///
/// Every ledger entry carries an `Amount`; the direction lives in the entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, LedgerError> {
        if value <= Decimal::ZERO {
            return Err(LedgerError::ValidationError(format!(
                "Amount must be positive, got {value}"
            )));
        }
        if value.normalize().scale() > MONEY_SCALE {
            return Err(LedgerError::ValidationError(format!(
                "Amount {value} has more than {MONEY_SCALE} decimal places"
            )));
        }
        Ok(Self(value))
    }

    /// Builds an amount from a possibly zero value; zero yields `None`.
    ///
    /// Used for optional fee legs that are skipped when nothing is charged.
    pub fn non_zero(value: Decimal) -> Result<Option<Self>, LedgerError> {
        if value.is_zero() {
            Ok(None)
        } else {
            Self::new(value).map(Some)
        }
    }

    /// Rounds to cents (half away from zero) before validating.
    pub fn rounded(value: Decimal) -> Result<Self, LedgerError> {
        Self::new(value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn covers(&self, amount: Amount) -> bool {
        self.0 >= amount.0
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_arithmetic() {
        let b1 = Balance::new(dec!(10.00));
        let b2 = Balance::new(dec!(25.50));
        assert_eq!(b1 + b2, Balance::new(dec!(35.50)));
        assert_eq!(b1 - b2, Balance::new(dec!(-15.50)));
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.00)).is_ok());
        assert!(Amount::new(dec!(0.01)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(LedgerError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(LedgerError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(1.005)),
            Err(LedgerError::ValidationError(_))
        ));
    }

    #[test]
    fn test_amount_trailing_zeros_are_accepted() {
        assert!(Amount::new(dec!(12.5000)).is_ok());
    }

    #[test]
    fn test_amount_rounding() {
        assert_eq!(Amount::rounded(dec!(40.005)).unwrap().value(), dec!(40.01));
        assert_eq!(Amount::rounded(dec!(40.004)).unwrap().value(), dec!(40.00));
    }

    #[test]
    fn test_non_zero_skips_zero() {
        assert!(Amount::non_zero(Decimal::ZERO).unwrap().is_none());
        assert!(Amount::non_zero(dec!(5)).unwrap().is_some());
    }

    #[test]
    fn test_amount_deserialization_is_validated() {
        let ok: Amount = serde_json::from_str("\"15.00\"").unwrap();
        assert_eq!(ok.value(), dec!(15.00));
        assert!(serde_json::from_str::<Amount>("\"-3\"").is_err());
    }

    #[test]
    fn test_display_uses_cents() {
        assert_eq!(Amount::new(dec!(500)).unwrap().to_string(), "500.00");
        assert_eq!(Balance::new(dec!(-2.5)).to_string(), "-2.50");
    }
}
