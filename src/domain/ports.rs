use super::money::{Amount, Balance};
use super::transaction::{LedgerEntry, Transaction, TransactionId, TransactionStatus, TransactionType};
use super::user::UserProfile;
use super::wallet::{OwnerId, Wallet, WalletId, WalletType};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Read access and lifecycle operations for wallet records.
///
/// Balances are never written through this trait; they change only inside a
/// [`UnitOfWork`].
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Persists a new wallet unless its owner already holds `cap` wallets of
    /// the same type. The check and the insert are atomic.
    async fn create_wallet(&self, wallet: Wallet, cap: usize) -> Result<Wallet>;
    async fn wallet(&self, id: WalletId) -> Result<Option<Wallet>>;
    async fn wallets_of(&self, owner: OwnerId) -> Result<Vec<Wallet>>;
    async fn system_wallet(&self, wallet_type: WalletType) -> Result<Option<Wallet>>;
    async fn all_wallets(&self) -> Result<Vec<Wallet>>;
    async fn set_frozen(&self, id: WalletId, frozen: bool) -> Result<Wallet>;

    /// The owner's primary wallet of a type, falling back to the oldest one.
    async fn find_primary(&self, owner: OwnerId, wallet_type: WalletType) -> Result<Option<Wallet>> {
        let mut candidates: Vec<Wallet> = self
            .wallets_of(owner)
            .await?
            .into_iter()
            .filter(|w| w.wallet_type == wallet_type)
            .collect();
        candidates.sort_by(|a, b| {
            b.is_primary
                .cmp(&a.is_primary)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(candidates.into_iter().next())
    }
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>>;
    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>>;

    /// Replaces the stored header if its current status is still `expected`.
    ///
    /// Fails with `ConcurrentModification` otherwise. Entries are immutable and
    /// never touched by this call.
    async fn update_transaction(&self, tx: &Transaction, expected: TransactionStatus) -> Result<()>;

    async fn transactions_with_status(&self, status: TransactionStatus) -> Result<Vec<Transaction>>;
    async fn entries_for_transaction(&self, id: TransactionId) -> Result<Vec<LedgerEntry>>;

    /// Entries of a wallet, newest first.
    async fn entries_for_wallet(&self, wallet: WalletId) -> Result<Vec<LedgerEntry>>;

    /// Approved transactions of `transaction_type` whose release date has passed.
    async fn due_releases(
        &self,
        transaction_type: TransactionType,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let mut due: Vec<Transaction> = self
            .transactions_with_status(TransactionStatus::Approved)
            .await?
            .into_iter()
            .filter(|tx| tx.transaction_type == transaction_type && tx.is_due(now))
            .collect();
        due.sort_by_key(|tx| tx.scheduled_release_date);
        Ok(due)
    }
}

/// Entry point to the atomic write path.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

/// One atomic unit of ledger work.
///
/// Wallet locks are exclusive and must be requested in ascending wallet id
/// order. They are held until the unit is committed or dropped. Dropping a
/// unit without committing discards every staged change.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Locks a wallet for the rest of the unit and returns its staged state.
    async fn lock_for_update(&mut self, id: WalletId) -> Result<Wallet>;

    /// Stages a new balance for a wallet previously locked by this unit.
    fn set_balance(&mut self, id: WalletId, balance: Balance) -> Result<()>;

    async fn insert_transaction(&mut self, tx: Transaction) -> Result<()>;
    fn insert_entry(&mut self, entry: LedgerEntry) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Everything the application layer needs from persistence.
pub trait Repository: WalletStore + TransactionStore + LedgerStore {}

impl<T> Repository for T where T: WalletStore + TransactionStore + LedgerStore {}

pub type RepositoryRef = Arc<dyn Repository>;

/// Outbound mobile-money payouts.
#[async_trait]
pub trait PaymentRail: Send + Sync {
    /// Sends `amount` to `destination`. Calls with the same `reference` must be
    /// idempotent. Returns the provider receipt.
    async fn payout(&self, destination: &str, amount: Amount, reference: &str) -> Result<String>;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, recipient: &str, text: &str) -> Result<()>;
    async fn send_receipt(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

/// Signed settlement callbacks to the platform's consumers.
#[async_trait]
pub trait WebhookEmitter: Send + Sync {
    async fn emit(&self, reference: &str, status: TransactionStatus) -> Result<()>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user(&self, id: OwnerId) -> Result<Option<UserProfile>>;

    /// Looks a user up by email (case-insensitive), phone or username.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserProfile>>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
