use crate::domain::money::Balance;
use crate::domain::ports::UnitOfWork;
use crate::domain::transaction::{LedgerEntry, Transaction};
use crate::domain::wallet::{Wallet, WalletId};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Exclusive per-wallet locks shared by every unit of work of one store.
#[derive(Default)]
pub struct LockTable {
    locks: Mutex<HashMap<WalletId, Arc<Mutex<()>>>>,
}

impl LockTable {
    pub async fn acquire(&self, id: WalletId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Everything a unit of work writes, applied by the backend in one step.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub balances: BTreeMap<WalletId, Balance>,
    pub transactions: Vec<Transaction>,
    pub entries: Vec<LedgerEntry>,
}

/// Storage side of a [`StagedUnitOfWork`].
#[async_trait]
pub trait CommitBackend: Send + Sync + 'static {
    async fn load_wallet(&self, id: WalletId) -> Result<Option<Wallet>>;
    async fn reference_taken(&self, reference: &str) -> Result<bool>;

    /// Applies the change set atomically. Must re-check reference uniqueness
    /// and must only touch the `balance` field of existing wallets.
    async fn apply(&self, changes: ChangeSet) -> Result<()>;
}

/// Unit of work that stages changes in memory and hands them to the backend
/// on commit. Wallet guards live until the unit is committed or dropped.
pub struct StagedUnitOfWork<B: CommitBackend> {
    backend: B,
    locks: Arc<LockTable>,
    guards: BTreeMap<WalletId, OwnedMutexGuard<()>>,
    wallets: BTreeMap<WalletId, Wallet>,
    changes: ChangeSet,
}

impl<B: CommitBackend> StagedUnitOfWork<B> {
    pub fn new(backend: B, locks: Arc<LockTable>) -> Self {
        Self {
            backend,
            locks,
            guards: BTreeMap::new(),
            wallets: BTreeMap::new(),
            changes: ChangeSet::default(),
        }
    }
}

#[async_trait]
impl<B: CommitBackend> UnitOfWork for StagedUnitOfWork<B> {
    async fn lock_for_update(&mut self, id: WalletId) -> Result<Wallet> {
        if let Some(wallet) = self.wallets.get(&id) {
            return Ok(wallet.clone());
        }
        if let Some(&held) = self.guards.keys().next_back()
            && id < held
        {
            return Err(LedgerError::LockOrderViolation { held, requested: id });
        }

        let guard = self.locks.acquire(id).await;
        let wallet = self
            .backend
            .load_wallet(id)
            .await?
            .ok_or(LedgerError::WalletNotFound(id))?;

        self.guards.insert(id, guard);
        self.wallets.insert(id, wallet.clone());
        Ok(wallet)
    }

    fn set_balance(&mut self, id: WalletId, balance: Balance) -> Result<()> {
        let wallet = self.wallets.get_mut(&id).ok_or_else(|| {
            LedgerError::ValidationError(format!("wallet {id} is not locked by this unit"))
        })?;
        wallet.balance = balance;
        self.changes.balances.insert(id, balance);
        Ok(())
    }

    async fn insert_transaction(&mut self, tx: Transaction) -> Result<()> {
        let staged = self
            .changes
            .transactions
            .iter()
            .any(|t| t.reference == tx.reference);
        if staged || self.backend.reference_taken(&tx.reference).await? {
            return Err(LedgerError::DuplicateReference(tx.reference));
        }
        self.changes.transactions.push(tx);
        Ok(())
    }

    fn insert_entry(&mut self, entry: LedgerEntry) -> Result<()> {
        if !self.wallets.contains_key(&entry.wallet_id) {
            return Err(LedgerError::ValidationError(format!(
                "entry targets wallet {} which is not locked by this unit",
                entry.wallet_id
            )));
        }
        if !self
            .changes
            .transactions
            .iter()
            .any(|t| t.id == entry.transaction_id)
        {
            return Err(LedgerError::TransactionNotFound(
                entry.transaction_id.to_string(),
            ));
        }
        self.changes.entries.push(entry);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.backend.apply(this.changes).await?;
        // Guards are released only once the change set is visible.
        drop(this.guards);
        Ok(())
    }
}
