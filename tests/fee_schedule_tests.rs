use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use wallet_ledger::application::fees::FeeCalculator;
use wallet_ledger::config::default_fee_tiers;
use wallet_ledger::domain::fee::FeeTier;
use wallet_ledger::domain::money::Amount;
use wallet_ledger::error::LedgerError;

/// Random contiguous schedule starting at 0.01.
fn random_schedule(rng: &mut StdRng) -> Vec<FeeTier> {
    let mut tiers = Vec::new();
    let mut min = dec!(0.01);
    for _ in 0..rng.gen_range(1..8) {
        let width = Decimal::new(rng.gen_range(1..=1_000_000), 2);
        let max = min + width;
        tiers.push(FeeTier {
            min_amount: min,
            max_amount: max,
            service_fee: Decimal::new(rng.gen_range(0..10_000), 2),
            network_fee: Decimal::new(rng.gen_range(0..5_000), 2),
        });
        min = max + dec!(0.01);
    }
    tiers
}

#[test]
fn test_contiguous_schedules_cover_every_cent() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..50 {
        let tiers = random_schedule(&mut rng);
        let upper = tiers.last().unwrap().max_amount;
        let calculator = FeeCalculator::new(tiers.clone()).unwrap();

        for _ in 0..100 {
            let cents = rng.gen_range(1..=(upper * dec!(100)).to_i64().unwrap());
            let value = Decimal::new(cents, 2);
            let matching = tiers.iter().filter(|t| t.contains(value)).count();
            assert_eq!(matching, 1, "{value} matched {matching} tiers");

            let quote = calculator.quote(Amount::new(value).unwrap()).unwrap();
            let tier = calculator.tier_for(quote.amount).unwrap();
            assert_eq!(
                quote.total_deduction.value(),
                value + tier.service_fee + tier.network_fee
            );
        }
    }
}

#[test]
fn test_gaps_and_overlaps_are_rejected() {
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..50 {
        let mut tiers = random_schedule(&mut rng);
        if tiers.len() < 2 {
            continue;
        }
        let i = rng.gen_range(1..tiers.len());

        let mut gapped = tiers.clone();
        gapped[i].min_amount += dec!(0.01);
        if gapped[i].min_amount <= gapped[i].max_amount {
            assert!(matches!(
                FeeCalculator::new(gapped),
                Err(LedgerError::InvalidFeeSchedule(_))
            ));
        }

        tiers[i].min_amount = tiers[i - 1].max_amount;
        assert!(matches!(
            FeeCalculator::new(tiers),
            Err(LedgerError::InvalidFeeSchedule(_))
        ));
    }
}

#[test]
fn test_amounts_above_schedule_are_free() {
    let calculator = FeeCalculator::new(default_fee_tiers()).unwrap();
    let quote = calculator.quote(Amount::new(dec!(200000.00)).unwrap()).unwrap();
    assert_eq!(quote.service_fee, Decimal::ZERO);
    assert_eq!(quote.network_fee, Decimal::ZERO);
    assert_eq!(quote.total_deduction.value(), dec!(200000.00));

    let boundary = calculator.quote(Amount::new(dec!(500.01)).unwrap()).unwrap();
    assert_eq!(boundary.total_deduction.value(), dec!(515.01));
}
