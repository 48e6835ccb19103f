use super::unit_of_work::{ChangeSet, CommitBackend, LockTable, StagedUnitOfWork};
use crate::domain::ports::{LedgerStore, TransactionStore, UnitOfWork, UserDirectory, WalletStore};
use crate::domain::transaction::{LedgerEntry, Transaction, TransactionId, TransactionStatus};
use crate::domain::user::{KycStatus, UserProfile};
use crate::domain::wallet::{OwnerId, Wallet, WalletId, WalletType};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    wallets: HashMap<WalletId, Wallet>,
    transactions: HashMap<TransactionId, Transaction>,
    references: HashMap<String, TransactionId>,
    /// Append-only, in commit order.
    entries: Vec<LedgerEntry>,
    wallet_entries: HashMap<WalletId, Vec<usize>>,
    transaction_entries: HashMap<TransactionId, Vec<usize>>,
}

/// A thread-safe in-memory ledger store.
///
/// Uses `Arc<RwLock<State>>` for shared access; `Clone` shares the same state.
/// Ideal for tests and script replay where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    locks: Arc<LockTable>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletStore for InMemoryStore {
    async fn create_wallet(&self, mut wallet: Wallet, cap: usize) -> Result<Wallet> {
        let mut state = self.state.write().await;
        let existing = state
            .wallets
            .values()
            .filter(|w| w.owner == wallet.owner && w.wallet_type == wallet.wallet_type)
            .count();
        if existing >= cap {
            return Err(LedgerError::WalletLimitExceeded {
                wallet_type: wallet.wallet_type,
                limit: cap,
            });
        }
        wallet.is_primary = existing == 0;
        state.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        let state = self.state.read().await;
        Ok(state.wallets.get(&id).cloned())
    }

    async fn wallets_of(&self, owner: OwnerId) -> Result<Vec<Wallet>> {
        let state = self.state.read().await;
        let mut wallets: Vec<Wallet> = state
            .wallets
            .values()
            .filter(|w| w.is_owned_by(owner))
            .cloned()
            .collect();
        wallets.sort_by_key(|w| w.created_at);
        Ok(wallets)
    }

    async fn system_wallet(&self, wallet_type: WalletType) -> Result<Option<Wallet>> {
        let state = self.state.read().await;
        Ok(state
            .wallets
            .values()
            .find(|w| w.owner.is_none() && w.wallet_type == wallet_type)
            .cloned())
    }

    async fn all_wallets(&self) -> Result<Vec<Wallet>> {
        let state = self.state.read().await;
        let mut wallets: Vec<Wallet> = state.wallets.values().cloned().collect();
        wallets.sort_by_key(|w| w.created_at);
        Ok(wallets)
    }

    async fn set_frozen(&self, id: WalletId, frozen: bool) -> Result<Wallet> {
        // Waits for any unit of work holding the wallet.
        let _wallet = self.locks.acquire(id).await;
        let mut state = self.state.write().await;
        let wallet = state
            .wallets
            .get_mut(&id)
            .ok_or(LedgerError::WalletNotFound(id))?;
        wallet.is_frozen = frozen;
        Ok(wallet.clone())
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state.transactions.get(&id).cloned())
    }

    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .references
            .get(reference)
            .and_then(|id| state.transactions.get(id))
            .cloned())
    }

    async fn update_transaction(&self, tx: &Transaction, expected: TransactionStatus) -> Result<()> {
        let mut state = self.state.write().await;
        let current = state
            .transactions
            .get_mut(&tx.id)
            .ok_or_else(|| LedgerError::TransactionNotFound(tx.reference.clone()))?;
        if current.status != expected {
            return Err(LedgerError::ConcurrentModification(tx.reference.clone()));
        }
        *current = tx.clone();
        Ok(())
    }

    async fn transactions_with_status(&self, status: TransactionStatus) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut found: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|tx| tx.status == status)
            .cloned()
            .collect();
        found.sort_by_key(|tx| tx.created_at);
        Ok(found)
    }

    async fn entries_for_transaction(&self, id: TransactionId) -> Result<Vec<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state
            .transaction_entries
            .get(&id)
            .map(|idx| idx.iter().map(|&i| state.entries[i].clone()).collect())
            .unwrap_or_default())
    }

    async fn entries_for_wallet(&self, wallet: WalletId) -> Result<Vec<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state
            .wallet_entries
            .get(&wallet)
            .map(|idx| idx.iter().rev().map(|&i| state.entries[i].clone()).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl CommitBackend for InMemoryStore {
    async fn load_wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        WalletStore::wallet(self, id).await
    }

    async fn reference_taken(&self, reference: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.references.contains_key(reference))
    }

    async fn apply(&self, changes: ChangeSet) -> Result<()> {
        let mut state = self.state.write().await;

        // Validate everything before the first write.
        for tx in &changes.transactions {
            if state.references.contains_key(&tx.reference) {
                return Err(LedgerError::DuplicateReference(tx.reference.clone()));
            }
        }
        if let Some(missing) = changes
            .balances
            .keys()
            .find(|id| !state.wallets.contains_key(id))
        {
            return Err(LedgerError::WalletNotFound(*missing));
        }

        for (id, balance) in changes.balances {
            if let Some(wallet) = state.wallets.get_mut(&id) {
                wallet.balance = balance;
            }
        }
        for tx in changes.transactions {
            state.references.insert(tx.reference.clone(), tx.id);
            state.transactions.insert(tx.id, tx);
        }
        for entry in changes.entries {
            let index = state.entries.len();
            state
                .wallet_entries
                .entry(entry.wallet_id)
                .or_default()
                .push(index);
            state
                .transaction_entries
                .entry(entry.transaction_id)
                .or_default()
                .push(index);
            state.entries.push(entry);
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        Ok(Box::new(StagedUnitOfWork::new(
            self.clone(),
            self.locks.clone(),
        )))
    }
}

/// In-memory user directory used by tests and script replay.
#[derive(Default, Clone)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<OwnerId, UserProfile>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, profile: UserProfile) -> OwnerId {
        let id = profile.id;
        self.users.write().await.insert(id, profile);
        id
    }

    pub async fn set_kyc(&self, id: OwnerId, kyc: KycStatus) -> Result<()> {
        let mut users = self.users.write().await;
        let profile = users
            .get_mut(&id)
            .ok_or_else(|| LedgerError::UserNotFound(id.to_string()))?;
        profile.kyc = kyc;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn user(&self, id: OwnerId) -> Result<Option<UserProfile>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserProfile>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|profile| profile.matches_identifier(identifier))
            .cloned())
    }
}
