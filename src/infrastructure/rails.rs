use crate::domain::money::Amount;
use crate::domain::ports::PaymentRail;
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// A payout accepted by the simulated rail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub destination: String,
    pub amount: Amount,
    pub reference: String,
    pub receipt: String,
}

#[derive(Default)]
struct RailState {
    /// reference -> accepted payout
    accepted: HashMap<String, Payout>,
    /// Number of upcoming calls that will fail.
    failures_pending: u32,
    unreachable: HashSet<String>,
    /// Accept payouts but answer too late for the caller.
    slow_ack: bool,
    calls: u32,
}

/// Simulated mobile-money B2C rail.
///
/// Idempotent by reference: paying the same reference twice returns the first
/// receipt and moves no extra money. Failures can be injected for tests.
pub struct SimulatedRail {
    name: String,
    state: Mutex<RailState>,
}

impl SimulatedRail {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(RailState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, RailState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next `count` calls fail.
    pub fn fail_next(&self, count: u32) {
        self.state().failures_pending = count;
    }

    /// Makes every payout to `destination` fail until cleared.
    pub fn set_unreachable(&self, destination: &str, unreachable: bool) {
        let mut state = self.state();
        if unreachable {
            state.unreachable.insert(destination.to_string());
        } else {
            state.unreachable.remove(destination);
        }
    }

    /// Accepts payouts as usual but delays every answer by a minute, so callers
    /// time out on transfers that did go through.
    pub fn set_slow_ack(&self, slow: bool) {
        self.state().slow_ack = slow;
    }

    pub fn payouts(&self) -> Vec<Payout> {
        let mut payouts: Vec<Payout> = self.state().accepted.values().cloned().collect();
        payouts.sort_by(|a, b| a.reference.cmp(&b.reference));
        payouts
    }

    /// Total number of payout calls, including failed and repeated ones.
    pub fn calls(&self) -> u32 {
        self.state().calls
    }
}

impl Default for SimulatedRail {
    fn default() -> Self {
        Self::new("mpesa-sim")
    }
}

#[async_trait]
impl PaymentRail for SimulatedRail {
    async fn payout(&self, destination: &str, amount: Amount, reference: &str) -> Result<String> {
        log::debug!(
            "[{}] payout({}, destination={}, amount={})",
            self.name,
            reference,
            destination,
            amount
        );
        let (result, slow_ack) = self.accept(destination, amount, reference);
        if slow_ack {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        }
        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl SimulatedRail {
    fn accept(&self, destination: &str, amount: Amount, reference: &str) -> (Result<String>, bool) {
        let mut state = self.state();
        state.calls += 1;
        let slow_ack = state.slow_ack;

        if let Some(existing) = state.accepted.get(reference) {
            return (Ok(existing.receipt.clone()), slow_ack);
        }
        if state.failures_pending > 0 {
            state.failures_pending -= 1;
            let err = LedgerError::PaymentRailFailure(format!(
                "{} rejected {reference}: service unavailable",
                self.name
            ));
            return (Err(err), false);
        }
        if destination.trim().is_empty() || state.unreachable.contains(destination) {
            let err = LedgerError::PaymentRailFailure(format!(
                "{} cannot reach '{destination}'",
                self.name
            ));
            return (Err(err), false);
        }

        let receipt = format!(
            "B2C-{}",
            Uuid::new_v4().simple().to_string()[..10].to_uppercase()
        );
        state.accepted.insert(
            reference.to_string(),
            Payout {
                destination: destination.to_string(),
                amount,
                reference: reference.to_string(),
                receipt: receipt.clone(),
            },
        );
        (Ok(receipt), slow_ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amount() -> Amount {
        Amount::new(dec!(500.00)).unwrap()
    }

    #[tokio::test]
    async fn test_payout_is_idempotent_by_reference() {
        let rail = SimulatedRail::default();
        let first = rail.payout("+254700000001", amount(), "WD-P-AAAA").await.unwrap();
        let second = rail.payout("+254700000001", amount(), "WD-P-AAAA").await.unwrap();

        assert!(first.starts_with("B2C-"));
        assert_eq!(first.len(), 14);
        assert_eq!(first, second);
        assert_eq!(rail.payouts().len(), 1);
        assert_eq!(rail.calls(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let rail = SimulatedRail::default();
        rail.fail_next(1);

        assert!(matches!(
            rail.payout("+254700000001", amount(), "WD-P-BBBB").await,
            Err(LedgerError::PaymentRailFailure(_))
        ));
        assert!(rail.payout("+254700000001", amount(), "WD-P-BBBB").await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_destination() {
        let rail = SimulatedRail::default();
        rail.set_unreachable("+254700000009", true);
        assert!(rail.payout("+254700000009", amount(), "WD-P-CCCC").await.is_err());
        assert!(rail.payout("", amount(), "WD-P-DDDD").await.is_err());

        rail.set_unreachable("+254700000009", false);
        assert!(rail.payout("+254700000009", amount(), "WD-P-CCCC").await.is_ok());
    }
}
