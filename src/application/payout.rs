use super::events::SettlementEvents;
use super::ledger::{LedgerEngine, LedgerPosting};
use super::notifications::{Notification, NotificationQueue};
use super::rail::RailClient;
use crate::domain::ports::{Clock, RepositoryRef};
use crate::domain::transaction::{
    EntryRequest, EntryType, LedgerEntry, Transaction, TransactionStatus, TransactionType,
};
use crate::domain::wallet::{WalletId, WalletType};
use crate::error::{LedgerError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Outcome of one batch run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReleaseReport {
    pub released: Vec<String>,
    /// Reference and reason of every item left for the next run.
    pub failed: Vec<(String, String)>,
    /// Items that exhausted their attempts and were put on hold.
    pub escalated: Vec<String>,
}

impl ReleaseReport {
    pub fn is_empty(&self) -> bool {
        self.released.is_empty() && self.failed.is_empty() && self.escalated.is_empty()
    }
}

/// Periodic batch that settles approved held transactions whose release date
/// has passed.
///
/// Items are processed one at a time, each in its own unit of work. A failing
/// item stays `APPROVED` for the next run and never affects the others.
pub struct PayoutReleaseJob {
    repo: RepositoryRef,
    ledger: Arc<LedgerEngine>,
    rail: Arc<RailClient>,
    clock: Arc<dyn Clock>,
    notifications: Arc<NotificationQueue>,
    events: Arc<SettlementEvents>,
    max_attempts: u32,
}

impl PayoutReleaseJob {
    pub fn new(
        repo: RepositoryRef,
        ledger: Arc<LedgerEngine>,
        rail: Arc<RailClient>,
        clock: Arc<dyn Clock>,
        notifications: Arc<NotificationQueue>,
        events: Arc<SettlementEvents>,
        max_attempts: u32,
    ) -> Self {
        Self {
            repo,
            ledger,
            rail,
            clock,
            notifications,
            events,
            max_attempts,
        }
    }

    pub async fn run(&self) -> Result<ReleaseReport> {
        let now = self.clock.now();
        let mut due = self
            .repo
            .due_releases(TransactionType::Withdrawal, now)
            .await?;
        due.extend(self.repo.due_releases(TransactionType::Transfer, now).await?);

        let mut report = ReleaseReport::default();
        for tx in due {
            let reference = tx.reference.clone();
            match self.release(tx).await {
                Ok(_) => report.released.push(reference),
                Err(e) => {
                    log::warn!("Release of {reference} failed: {e}");
                    match self.record_failure(&reference).await {
                        Ok(true) => report.escalated.push(reference),
                        Ok(false) => report.failed.push((reference, e.to_string())),
                        Err(record_err) => {
                            log::error!("Could not record failed release of {reference}: {record_err}");
                            report.failed.push((reference, e.to_string()));
                        }
                    }
                }
            }
        }

        if !report.is_empty() {
            log::info!(
                "Release batch: {} released, {} failed, {} escalated",
                report.released.len(),
                report.failed.len(),
                report.escalated.len()
            );
        }
        Ok(report)
    }

    /// Runs the batch on a fixed period until the task is aborted.
    pub fn spawn(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = self.run().await {
                    log::error!("Release batch aborted: {e}");
                }
            }
        })
    }

    async fn release(&self, mut tx: Transaction) -> Result<Transaction> {
        let held = self.held_entry(&tx).await?;
        let suspense = self.system_wallet(WalletType::Suspense).await?;

        let (target, receipt) = match tx.transaction_type {
            TransactionType::Withdrawal => {
                let destination = tx.destination.clone().ok_or_else(|| {
                    LedgerError::ValidationError(format!("{} has no payout destination", tx.reference))
                })?;
                let master = self.system_wallet(WalletType::MasterLiquidity).await?;
                self.post_release(&tx, suspense, master, &held).await?;
                let receipt = self
                    .rail
                    .payout(&destination, held.amount, &tx.reference)
                    .await?;
                self.notifications.enqueue(Notification::message(
                    destination,
                    format!(
                        "{receipt} Confirmed. {} {} released for {}.",
                        self.ledger.currency(),
                        held.amount,
                        tx.reference
                    ),
                ));
                (master, Some(receipt))
            }
            TransactionType::Transfer => {
                let counterparty = tx.counterparty_wallet.ok_or_else(|| {
                    LedgerError::ValidationError(format!("{} has no destination wallet", tx.reference))
                })?;
                self.post_release(&tx, suspense, counterparty, &held).await?;
                (counterparty, None)
            }
            other => {
                return Err(LedgerError::ValidationError(format!(
                    "{other} transactions are not released by this job"
                )));
            }
        };

        tx.complete(receipt, self.clock.now())?;
        self.repo
            .update_transaction(&tx, TransactionStatus::Approved)
            .await?;
        log::info!("Released {} to wallet {target}", tx.reference);
        self.events.settled(&tx).await;
        Ok(tx)
    }

    /// Moves the held amount out of suspense under `<reference>-REL`.
    ///
    /// A duplicate reference means a previous run already settled the leg.
    async fn post_release(
        &self,
        tx: &Transaction,
        suspense: WalletId,
        target: WalletId,
        held: &LedgerEntry,
    ) -> Result<()> {
        let posting = LedgerPosting::new(
            format!("{}-REL", tx.reference),
            tx.transaction_type,
            format!("Release of {}", tx.reference),
        )
        .entry(EntryRequest::debit(suspense, held.amount))
        .entry(EntryRequest::credit(target, held.amount));

        match self.ledger.process(posting).await {
            Ok(_) => Ok(()),
            Err(LedgerError::DuplicateReference(reference)) => {
                log::debug!("{reference} already posted, retrying payout only");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Counts a failed attempt; puts the transaction on hold once the bound
    /// is reached. Returns whether it was escalated.
    async fn record_failure(&self, reference: &str) -> Result<bool> {
        let Some(mut tx) = self.repo.transaction_by_reference(reference).await? else {
            return Err(LedgerError::TransactionNotFound(reference.to_string()));
        };
        if tx.status != TransactionStatus::Approved {
            return Ok(false);
        }

        tx.release_attempts += 1;
        let escalate = tx.release_attempts >= self.max_attempts;
        if escalate {
            tx.hold()?;
            log::error!(
                "ALERT: release of {} failed {} times, transaction put on hold",
                tx.reference,
                tx.release_attempts
            );
        }
        self.repo
            .update_transaction(&tx, TransactionStatus::Approved)
            .await?;
        Ok(escalate)
    }

    /// The original debit of the held funds.
    async fn held_entry(&self, tx: &Transaction) -> Result<LedgerEntry> {
        self.repo
            .entries_for_transaction(tx.id)
            .await?
            .into_iter()
            .find(|entry| entry.entry_type == EntryType::Debit)
            .ok_or_else(|| {
                LedgerError::ValidationError(format!("{} has no debit entry", tx.reference))
            })
    }

    async fn system_wallet(&self, wallet_type: WalletType) -> Result<WalletId> {
        self.repo
            .system_wallet(wallet_type)
            .await?
            .map(|w| w.id)
            .ok_or(LedgerError::SystemWalletMissing(wallet_type))
    }
}
