use crate::domain::money::Amount;
use crate::domain::ports::PaymentRail;
use crate::error::{LedgerError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Retry and timeout policy for outbound payout calls.
#[derive(Debug, Clone, Copy)]
pub struct RailPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on each further attempt.
    pub retry_delay: Duration,
}

/// Wraps a [`PaymentRail`] with a per-call timeout and bounded retries.
///
/// Retrying is safe because rails are idempotent by reference. When the last
/// attempt times out the outcome is unknown and `PayoutUnconfirmed` is
/// returned instead of `PaymentRailFailure`.
pub struct RailClient {
    rail: Arc<dyn PaymentRail>,
    policy: RailPolicy,
}

impl RailClient {
    pub fn new(rail: Arc<dyn PaymentRail>, policy: RailPolicy) -> Self {
        Self { rail, policy }
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        self.policy.retry_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    pub async fn payout(&self, destination: &str, amount: Amount, reference: &str) -> Result<String> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();
        let mut timed_out = false;

        for attempt in 1..=max_attempts {
            match tokio::time::timeout(
                self.policy.timeout,
                self.rail.payout(destination, amount, reference),
            )
            .await
            {
                Ok(Ok(receipt)) => {
                    log::info!(
                        "Payout {reference} of {amount} to {destination} accepted by {} ({receipt})",
                        self.rail.name()
                    );
                    return Ok(receipt);
                }
                Ok(Err(e)) => {
                    timed_out = false;
                    last_error = e.to_string();
                }
                Err(_) => {
                    timed_out = true;
                    last_error = format!("{} timed out after {:?}", self.rail.name(), self.policy.timeout)
                }
            }

            log::warn!("Payout {reference} attempt {attempt}/{max_attempts} failed: {last_error}");
            if attempt < max_attempts {
                tokio::time::sleep(self.retry_delay(attempt)).await;
            }
        }

        if timed_out {
            log::error!("Payout {reference} unconfirmed: {last_error}");
            return Err(LedgerError::PayoutUnconfirmed(reference.to_string()));
        }
        Err(LedgerError::PaymentRailFailure(last_error))
    }
}
