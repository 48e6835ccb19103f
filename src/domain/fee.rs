use super::money::Amount;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One operator-configured withdrawal fee band, inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTier {
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    /// Kept by the platform.
    #[serde(default)]
    pub service_fee: Decimal,
    /// Charged by the mobile-money network.
    #[serde(default)]
    pub network_fee: Decimal,
}

impl FeeTier {
    pub fn contains(&self, amount: Decimal) -> bool {
        self.min_amount <= amount && amount <= self.max_amount
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeQuote {
    pub amount: Amount,
    pub service_fee: Decimal,
    pub network_fee: Decimal,
    /// Amount plus both fees: what leaves the source wallet.
    pub total_deduction: Amount,
}
