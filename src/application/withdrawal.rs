use super::events::SettlementEvents;
use super::fees::FeeCalculator;
use super::ledger::{LedgerEngine, LedgerPosting, PostedTransaction};
use super::notifications::{Notification, NotificationQueue};
use super::rail::RailClient;
use crate::domain::money::Amount;
use crate::domain::ports::{Clock, RepositoryRef, UserDirectory};
use crate::domain::transaction::{
    EntryRequest, EntryType, LedgerEntry, Transaction, TransactionStatus, TransactionType,
    new_reference,
};
use crate::domain::wallet::{OwnerId, WalletId, WalletType};
use crate::error::{LedgerError, Result};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct WithdrawalRequest {
    pub owner: OwnerId,
    pub wallet: WalletId,
    pub amount: Amount,
    /// Payout phone number; defaults to the owner's phone.
    pub destination: Option<String>,
}

/// Cash-out to mobile money.
///
/// Checks run in a fixed order: identity verification, fee quote, then the
/// source wallet. Customer withdrawals are paid out immediately; organizer
/// withdrawals are held in suspense for approval.
pub struct WithdrawalOrchestrator {
    repo: RepositoryRef,
    users: Arc<dyn UserDirectory>,
    ledger: Arc<LedgerEngine>,
    fees: Arc<FeeCalculator>,
    rail: Arc<RailClient>,
    notifications: Arc<NotificationQueue>,
    events: Arc<SettlementEvents>,
    clock: Arc<dyn Clock>,
}

impl WithdrawalOrchestrator {
    pub fn new(
        repo: RepositoryRef,
        users: Arc<dyn UserDirectory>,
        ledger: Arc<LedgerEngine>,
        fees: Arc<FeeCalculator>,
        rail: Arc<RailClient>,
        notifications: Arc<NotificationQueue>,
        events: Arc<SettlementEvents>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            users,
            ledger,
            fees,
            rail,
            notifications,
            events,
            clock,
        }
    }

    async fn system_wallet(&self, wallet_type: WalletType) -> Result<WalletId> {
        self.repo
            .system_wallet(wallet_type)
            .await?
            .map(|w| w.id)
            .ok_or(LedgerError::SystemWalletMissing(wallet_type))
    }

    pub async fn withdraw(&self, request: WithdrawalRequest) -> Result<Transaction> {
        let profile = self
            .users
            .user(request.owner)
            .await?
            .ok_or_else(|| LedgerError::UserNotFound(request.owner.to_string()))?;
        if !profile.kyc.is_verified() {
            return Err(LedgerError::KycRequired);
        }

        let quote = self.fees.quote(request.amount)?;

        let wallet = self
            .repo
            .wallet(request.wallet)
            .await?
            .filter(|w| w.is_owned_by(request.owner))
            .ok_or(LedgerError::WalletNotFound(request.wallet))?;
        if wallet.is_frozen {
            return Err(LedgerError::WalletFrozen(wallet.id));
        }
        if !wallet.balance.covers(quote.total_deduction) {
            return Err(LedgerError::InsufficientFunds {
                wallet: wallet.id,
                available: wallet.balance.value(),
                required: quote.total_deduction.value(),
            });
        }

        let destination = request
            .destination
            .or(profile.phone.clone())
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .ok_or_else(|| {
                LedgerError::ValidationError("no payout phone number on file".to_string())
            })?;
        let debit = EntryRequest::debit(wallet.id, quote.total_deduction).guarded();

        match wallet.wallet_type {
            WalletType::Organizer => {
                let suspense = self.system_wallet(WalletType::Suspense).await?;
                let posted = self
                    .ledger
                    .process(
                        LedgerPosting::new(
                            new_reference("WD-ORG"),
                            TransactionType::Withdrawal,
                            format!("Withdrawal of {} to {destination}", request.amount),
                        )
                        .entry(debit)
                        .entry(EntryRequest::credit(suspense, quote.total_deduction))
                        .status(TransactionStatus::PendingApproval)
                        .destination(destination.clone()),
                    )
                    .await?;
                self.notifications.enqueue(Notification::message(
                    destination,
                    format!(
                        "Withdrawal {} of {} {} received and awaiting approval.",
                        posted.transaction.reference,
                        self.ledger.currency(),
                        request.amount
                    ),
                ));
                Ok(posted.transaction)
            }
            WalletType::Customer => {
                let master = self.system_wallet(WalletType::MasterLiquidity).await?;
                let revenue = self.system_wallet(WalletType::Revenue).await?;

                let mut posting = LedgerPosting::new(
                    new_reference("WD-P"),
                    TransactionType::Withdrawal,
                    format!("Withdrawal of {} to {destination}", request.amount),
                )
                .entry(debit)
                .entry(EntryRequest::credit(master, request.amount))
                .status(TransactionStatus::Pending)
                .destination(destination.clone());
                if let Some(network_fee) = Amount::non_zero(quote.network_fee)? {
                    posting = posting.entry(EntryRequest::credit(master, network_fee));
                }
                if let Some(service_fee) = Amount::non_zero(quote.service_fee)? {
                    posting = posting.entry(EntryRequest::credit(revenue, service_fee));
                }

                let posted = self.ledger.process(posting).await?;
                self.disburse(posted, &destination, request.amount, profile.email.as_deref())
                    .await
            }
            other => Err(LedgerError::ValidationError(format!(
                "{other} wallets cannot withdraw"
            ))),
        }
    }

    /// Finishes an instant withdrawal left `PENDING` by an unconfirmed payout.
    ///
    /// The payout is sent again under the original reference, which the rail
    /// treats idempotently, and the withdrawal is then completed or reversed.
    pub async fn resume(&self, reference: &str) -> Result<Transaction> {
        let tx = self
            .repo
            .transaction_by_reference(reference)
            .await?
            .ok_or_else(|| LedgerError::TransactionNotFound(reference.to_string()))?;
        if tx.transaction_type != TransactionType::Withdrawal || tx.status != TransactionStatus::Pending {
            return Err(LedgerError::InvalidTransition {
                reference: tx.reference,
                from: tx.status,
                to: TransactionStatus::Completed,
            });
        }
        let destination = tx.destination.clone().ok_or_else(|| {
            LedgerError::ValidationError(format!("{} has no payout destination", tx.reference))
        })?;
        let entries = self.repo.entries_for_transaction(tx.id).await?;
        let amount = self.payout_amount(&tx, &entries)?;

        log::info!("Resuming payout of {}", tx.reference);
        self.disburse(
            PostedTransaction {
                transaction: tx,
                entries,
            },
            &destination,
            amount,
            None,
        )
        .await
    }

    /// The master credit that carries the payout itself. The network fee is
    /// credited to the same wallet, so the leg is the one whose fee quote
    /// reproduces the debited total.
    fn payout_amount(&self, tx: &Transaction, entries: &[LedgerEntry]) -> Result<Amount> {
        let total = entries
            .iter()
            .find(|entry| entry.entry_type == EntryType::Debit)
            .map(|entry| entry.amount)
            .ok_or_else(|| {
                LedgerError::ValidationError(format!("{} has no debit entry", tx.reference))
            })?;
        entries
            .iter()
            .filter(|entry| entry.entry_type == EntryType::Credit)
            .map(|entry| entry.amount)
            .find(|amount| {
                self.fees
                    .quote(*amount)
                    .is_ok_and(|quote| quote.total_deduction == total)
            })
            .ok_or_else(|| {
                LedgerError::ValidationError(format!(
                    "cannot derive the payout amount of {}",
                    tx.reference
                ))
            })
    }

    /// Pays out a committed instant withdrawal, compensating it on failure.
    ///
    /// Once the rail has answered, the outcome is returned even if recording
    /// it fails. An unconfirmed payout is neither completed nor reversed; the
    /// withdrawal stays `PENDING` for [`resume`](Self::resume).
    async fn disburse(
        &self,
        posted: PostedTransaction,
        destination: &str,
        amount: Amount,
        email: Option<&str>,
    ) -> Result<Transaction> {
        let mut tx = posted.transaction.clone();
        match self.rail.payout(destination, amount, &tx.reference).await {
            Ok(receipt) => {
                tx.complete(Some(receipt.clone()), self.clock.now())?;
                self.record_outcome(&tx).await;
                self.notifications.enqueue(Notification::message(
                    destination,
                    format!(
                        "{receipt} Confirmed. {} {amount} sent to {destination}. Ref {}",
                        self.ledger.currency(),
                        tx.reference
                    ),
                ));
                if let Some(email) = email {
                    self.notifications.enqueue(Notification::receipt(
                        email,
                        format!("Withdrawal receipt {}", tx.reference),
                        format!(
                            "{} {amount} was sent to {destination}. Provider receipt: {receipt}.",
                            self.ledger.currency()
                        ),
                    ));
                }
                Ok(tx)
            }
            Err(LedgerError::PayoutUnconfirmed(reference)) => {
                log::error!("Payout {reference} unconfirmed, withdrawal left PENDING");
                Err(LedgerError::PayoutUnconfirmed(reference))
            }
            Err(e) => {
                log::error!("Payout for {} failed, reversing: {e}", tx.reference);
                self.reverse(&posted).await?;
                tx.fail()?;
                self.record_outcome(&tx).await;
                Err(match e {
                    LedgerError::PaymentRailFailure(reason) => LedgerError::PaymentRailFailure(reason),
                    other => LedgerError::PaymentRailFailure(other.to_string()),
                })
            }
        }
    }

    /// Writes the settled status and announces it. Both are best effort: the
    /// money has already moved.
    async fn record_outcome(&self, tx: &Transaction) {
        if let Err(e) = self
            .repo
            .update_transaction(tx, TransactionStatus::Pending)
            .await
        {
            log::error!(
                "{} settled as {} but the status write failed: {e}",
                tx.reference,
                tx.status
            );
        }
        self.events.settled(tx).await;
    }

    /// Posts the mirror image of every entry under `<reference>-REV`.
    async fn reverse(&self, posted: &PostedTransaction) -> Result<()> {
        let original = &posted.transaction;
        let mirror = posted.entries.iter().map(|entry| match entry.entry_type {
            EntryType::Debit => EntryRequest::credit(entry.wallet_id, entry.amount),
            EntryType::Credit => EntryRequest::debit(entry.wallet_id, entry.amount),
        });
        self.ledger
            .process(
                LedgerPosting::new(
                    format!("{}-REV", original.reference),
                    original.transaction_type,
                    format!("Reversal of {}", original.reference),
                )
                .entries(mirror)
                .compensating(),
            )
            .await?;
        Ok(())
    }
}
