use crate::domain::ports::WebhookEmitter;
use crate::domain::transaction::{Transaction, TransactionType};
use std::sync::Arc;
use std::time::Duration;

/// Best-effort settlement callbacks, fired after a commit.
///
/// Only designated transaction types are announced. Delivery failures and
/// timeouts are logged and never reach the caller.
pub struct SettlementEvents {
    emitter: Option<Arc<dyn WebhookEmitter>>,
    designated: Vec<TransactionType>,
    timeout: Duration,
}

impl SettlementEvents {
    pub fn new(
        emitter: Option<Arc<dyn WebhookEmitter>>,
        designated: Vec<TransactionType>,
        timeout: Duration,
    ) -> Self {
        Self {
            emitter,
            designated,
            timeout,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, Vec::new(), Duration::ZERO)
    }

    /// Returns whether a delivery was attempted and succeeded.
    pub async fn settled(&self, tx: &Transaction) -> bool {
        let Some(emitter) = &self.emitter else {
            return false;
        };
        if !self.designated.contains(&tx.transaction_type) {
            return false;
        }

        match tokio::time::timeout(self.timeout, emitter.emit(&tx.reference, tx.status)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                log::warn!("Webhook for {} failed: {e}", tx.reference);
                false
            }
            Err(_) => {
                log::warn!("Webhook for {} timed out after {:?}", tx.reference, self.timeout);
                false
            }
        }
    }
}
