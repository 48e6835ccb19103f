use super::ledger::{LedgerEngine, LedgerPosting};
use crate::domain::ports::{Clock, RepositoryRef};
use crate::domain::transaction::{
    EntryRequest, EntryType, LedgerEntry, Transaction, TransactionStatus,
};
use crate::domain::user::Actor;
use crate::domain::wallet::WalletType;
use crate::error::{LedgerError, Result};
use chrono::Duration;
use std::sync::Arc;

/// Operator actions on transactions whose funds sit in suspense.
///
/// Every status write is a compare-and-set against the status read at the
/// start of the action, so two operators racing on the same transaction
/// cannot both succeed.
pub struct ApprovalService {
    repo: RepositoryRef,
    ledger: Arc<LedgerEngine>,
    clock: Arc<dyn Clock>,
    release_delay: Duration,
}

impl ApprovalService {
    pub fn new(
        repo: RepositoryRef,
        ledger: Arc<LedgerEngine>,
        clock: Arc<dyn Clock>,
        release_delay: Duration,
    ) -> Self {
        Self {
            repo,
            ledger,
            clock,
            release_delay,
        }
    }

    async fn load(&self, reference: &str) -> Result<Transaction> {
        self.repo
            .transaction_by_reference(reference)
            .await?
            .ok_or_else(|| LedgerError::TransactionNotFound(reference.to_string()))
    }

    /// Approves a held transaction and schedules its release.
    ///
    /// Also lifts a hold: an `ON_HOLD` transaction is re-approved with a fresh
    /// release date.
    pub async fn approve(&self, reference: &str, actor: &Actor) -> Result<Transaction> {
        let mut tx = self.load(reference).await?;
        let expected = tx.status;
        tx.approve(actor, self.clock.now(), self.release_delay)?;
        self.repo.update_transaction(&tx, expected).await?;

        log::info!(
            "{} approved by {actor}, release scheduled for {}",
            tx.reference,
            tx.scheduled_release_date
                .map(|at| at.to_rfc3339())
                .unwrap_or_default()
        );
        Ok(tx)
    }

    /// Freezes a held transaction for investigation.
    pub async fn hold(&self, reference: &str, actor: &Actor) -> Result<Transaction> {
        let mut tx = self.load(reference).await?;
        let expected = tx.status;
        tx.hold()?;
        self.repo.update_transaction(&tx, expected).await?;
        log::warn!("{} put on hold by {actor}", tx.reference);
        Ok(tx)
    }

    /// Rejects a transaction awaiting approval and refunds the source wallet.
    ///
    /// The status moves to `REJECTED` first, so a racing approval can no
    /// longer win once the refund is underway. The refund is then posted under
    /// `<reference>-RFD`. If it fails (for instance because the source wallet
    /// was frozen), the transaction stays `REJECTED` and calling `reject`
    /// again finishes the refund.
    pub async fn reject(&self, reference: &str, actor: &Actor) -> Result<Transaction> {
        let mut tx = self.load(reference).await?;
        let refund_reference = format!("{}-RFD", tx.reference);
        let refunded = tx.status == TransactionStatus::Rejected
            && self
                .repo
                .transaction_by_reference(&refund_reference)
                .await?
                .is_some();
        match tx.status {
            TransactionStatus::PendingApproval => {
                tx.reject()?;
                self.repo
                    .update_transaction(&tx, TransactionStatus::PendingApproval)
                    .await?;
            }
            TransactionStatus::Rejected if !refunded => {
                log::info!("Resuming refund of rejected {}", tx.reference);
            }
            from => {
                return Err(LedgerError::InvalidTransition {
                    reference: tx.reference,
                    from,
                    to: TransactionStatus::Rejected,
                });
            }
        }

        let source = self.source_debit(&tx).await?;
        let suspense = self
            .repo
            .system_wallet(WalletType::Suspense)
            .await?
            .ok_or(LedgerError::SystemWalletMissing(WalletType::Suspense))?;

        let refund = LedgerPosting::new(
            refund_reference,
            tx.transaction_type,
            format!("Refund of rejected {}", tx.reference),
        )
        .entry(EntryRequest::debit(suspense.id, source.amount))
        .entry(EntryRequest::credit(source.wallet_id, source.amount));
        match self.ledger.process(refund).await {
            Ok(_) | Err(LedgerError::DuplicateReference(_)) => {}
            Err(e) => {
                log::error!(
                    "{} rejected by {actor} but its refund failed, retry the rejection: {e}",
                    tx.reference
                );
                return Err(e);
            }
        }

        log::warn!(
            "{} rejected by {actor}, {} refunded to wallet {}",
            tx.reference,
            source.amount,
            source.wallet_id
        );
        Ok(tx)
    }

    /// Transactions waiting for an operator decision, oldest first.
    pub async fn pending(&self) -> Result<Vec<Transaction>> {
        self.repo
            .transactions_with_status(TransactionStatus::PendingApproval)
            .await
    }

    async fn source_debit(&self, tx: &Transaction) -> Result<LedgerEntry> {
        self.repo
            .entries_for_transaction(tx.id)
            .await?
            .into_iter()
            .find(|entry| entry.entry_type == EntryType::Debit)
            .ok_or_else(|| {
                LedgerError::ValidationError(format!("{} has no debit entry", tx.reference))
            })
    }
}
