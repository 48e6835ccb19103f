use crate::domain::fee::{FeeQuote, FeeTier};
use crate::domain::money::{Amount, MONEY_SCALE};
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const CENT: Decimal = dec!(0.01);

/// Tiered withdrawal fee lookup over a validated, ordered schedule.
#[derive(Debug, Clone)]
pub struct FeeCalculator {
    tiers: Vec<FeeTier>,
}

impl FeeCalculator {
    /// Sorts the tiers by `min_amount` and validates the schedule.
    ///
    /// Consecutive tiers must neither overlap nor leave a gap of more than one
    /// cent, so every amount in the covered range maps to exactly one tier.
    pub fn new(mut tiers: Vec<FeeTier>) -> Result<Self> {
        tiers.sort_by(|a, b| a.min_amount.cmp(&b.min_amount));

        for tier in &tiers {
            if tier.min_amount < Decimal::ZERO || tier.min_amount > tier.max_amount {
                return Err(LedgerError::InvalidFeeSchedule(format!(
                    "tier [{}, {}] has an invalid range",
                    tier.min_amount, tier.max_amount
                )));
            }
            for fee in [tier.service_fee, tier.network_fee] {
                if fee < Decimal::ZERO || fee.normalize().scale() > MONEY_SCALE {
                    return Err(LedgerError::InvalidFeeSchedule(format!(
                        "tier [{}, {}] has an invalid fee {fee}",
                        tier.min_amount, tier.max_amount
                    )));
                }
            }
        }

        for pair in tiers.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.min_amount <= prev.max_amount {
                return Err(LedgerError::InvalidFeeSchedule(format!(
                    "tier starting at {} overlaps tier ending at {}",
                    next.min_amount, prev.max_amount
                )));
            }
            if next.min_amount > prev.max_amount + CENT {
                return Err(LedgerError::InvalidFeeSchedule(format!(
                    "gap between {} and {}",
                    prev.max_amount, next.min_amount
                )));
            }
        }

        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[FeeTier] {
        &self.tiers
    }

    pub fn tier_for(&self, amount: Amount) -> Option<&FeeTier> {
        self.tiers.iter().find(|tier| tier.contains(amount.value()))
    }

    /// Fees for a withdrawal of `amount`. Amounts outside every tier are free.
    pub fn quote(&self, amount: Amount) -> Result<FeeQuote> {
        let (service_fee, network_fee) = self
            .tier_for(amount)
            .map(|tier| (tier.service_fee, tier.network_fee))
            .unwrap_or((Decimal::ZERO, Decimal::ZERO));

        Ok(FeeQuote {
            amount,
            service_fee,
            network_fee,
            total_deduction: Amount::new(amount.value() + service_fee + network_fee)?,
        })
    }
}
