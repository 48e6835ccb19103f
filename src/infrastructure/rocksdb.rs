use super::unit_of_work::{ChangeSet, CommitBackend, LockTable, StagedUnitOfWork};
use crate::domain::ports::{LedgerStore, TransactionStore, UnitOfWork, WalletStore};
use crate::domain::transaction::{LedgerEntry, Transaction, TransactionId, TransactionStatus};
use crate::domain::wallet::{OwnerId, Wallet, WalletId, WalletType};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for wallet records.
pub const CF_WALLETS: &str = "wallets";
/// Column Family for transaction headers.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family mapping a unique reference to its transaction id.
pub const CF_REFERENCES: &str = "references";
/// Column Family for ledger entries.
pub const CF_ENTRIES: &str = "entries";
/// Index of entries by (wallet, created_at).
pub const CF_WALLET_INDEX: &str = "wallet_index";
/// Index of entries by transaction.
pub const CF_TRANSACTION_INDEX: &str = "transaction_index";

const COLUMN_FAMILIES: [&str; 6] = [
    CF_WALLETS,
    CF_TRANSACTIONS,
    CF_REFERENCES,
    CF_ENTRIES,
    CF_WALLET_INDEX,
    CF_TRANSACTION_INDEX,
];

/// A persistent ledger store backed by RocksDB.
///
/// Every entity lives in its own Column Family as JSON. A unit of work is
/// committed as a single `WriteBatch`; all read-modify-write paths are
/// serialized by `write_lock`.
///
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
    locks: Arc<LockTable>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
            locks: Arc::new(LockTable::default()),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            LedgerError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf_name)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        batch.put_cf(self.cf(cf_name)?, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf_name)?, IteratorMode::Start) {
            let (_key, value) = item?;
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(items)
    }

    fn has_reference(&self, reference: &str) -> Result<bool> {
        Ok(self
            .db
            .get_pinned_cf(self.cf(CF_REFERENCES)?, reference.as_bytes())?
            .is_some())
    }

    /// Keys of an index Column Family starting with `prefix`, in key order.
    fn index_keys(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Box<[u8]>>> {
        let mut keys = Vec::new();
        let iter = self
            .db
            .iterator_cf(self.cf(cf_name)?, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key);
        }
        Ok(keys)
    }

    fn entries_by_index(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<LedgerEntry>> {
        let mut entries = Vec::new();
        for key in self.index_keys(cf_name, prefix)? {
            let entry_key = &key[key.len() - 16..];
            if let Some(entry) = self.get_json(CF_ENTRIES, entry_key)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

/// Big-endian timestamp with the sign bit flipped so keys sort chronologically.
fn sortable_nanos(at: DateTime<Utc>) -> [u8; 8] {
    let nanos = at.timestamp_nanos_opt().unwrap_or_default();
    ((nanos as u64) ^ (1 << 63)).to_be_bytes()
}

fn wallet_index_key(entry: &LedgerEntry) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(entry.wallet_id.0.as_bytes());
    key.extend_from_slice(&sortable_nanos(entry.created_at));
    key.extend_from_slice(entry.id.as_bytes());
    key
}

fn transaction_index_key(entry: &LedgerEntry) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(entry.transaction_id.0.as_bytes());
    key.extend_from_slice(entry.id.as_bytes());
    key
}

#[async_trait]
impl WalletStore for RocksDBStore {
    async fn create_wallet(&self, mut wallet: Wallet, cap: usize) -> Result<Wallet> {
        let _guard = self.write_lock.lock().await;
        let existing = self
            .scan::<Wallet>(CF_WALLETS)?
            .iter()
            .filter(|w| w.owner == wallet.owner && w.wallet_type == wallet.wallet_type)
            .count();
        if existing >= cap {
            return Err(LedgerError::WalletLimitExceeded {
                wallet_type: wallet.wallet_type,
                limit: cap,
            });
        }
        wallet.is_primary = existing == 0;
        self.db.put_cf(
            self.cf(CF_WALLETS)?,
            wallet.id.0.as_bytes(),
            serde_json::to_vec(&wallet)?,
        )?;
        Ok(wallet)
    }

    async fn wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        self.get_json(CF_WALLETS, id.0.as_bytes())
    }

    async fn wallets_of(&self, owner: OwnerId) -> Result<Vec<Wallet>> {
        let mut wallets: Vec<Wallet> = self
            .scan::<Wallet>(CF_WALLETS)?
            .into_iter()
            .filter(|w| w.is_owned_by(owner))
            .collect();
        wallets.sort_by_key(|w| w.created_at);
        Ok(wallets)
    }

    async fn system_wallet(&self, wallet_type: WalletType) -> Result<Option<Wallet>> {
        Ok(self
            .scan::<Wallet>(CF_WALLETS)?
            .into_iter()
            .find(|w| w.owner.is_none() && w.wallet_type == wallet_type))
    }

    async fn all_wallets(&self) -> Result<Vec<Wallet>> {
        let mut wallets = self.scan::<Wallet>(CF_WALLETS)?;
        wallets.sort_by_key(|w| w.created_at);
        Ok(wallets)
    }

    async fn set_frozen(&self, id: WalletId, frozen: bool) -> Result<Wallet> {
        // Waits for any unit of work holding the wallet.
        let _wallet = self.locks.acquire(id).await;
        let _guard = self.write_lock.lock().await;
        let mut wallet: Wallet = self
            .get_json(CF_WALLETS, id.0.as_bytes())?
            .ok_or(LedgerError::WalletNotFound(id))?;
        wallet.is_frozen = frozen;
        self.db.put_cf(
            self.cf(CF_WALLETS)?,
            id.0.as_bytes(),
            serde_json::to_vec(&wallet)?,
        )?;
        Ok(wallet)
    }
}

#[async_trait]
impl TransactionStore for RocksDBStore {
    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        self.get_json(CF_TRANSACTIONS, id.0.as_bytes())
    }

    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        match self.db.get_cf(self.cf(CF_REFERENCES)?, reference.as_bytes())? {
            Some(id) => self.get_json(CF_TRANSACTIONS, &id),
            None => Ok(None),
        }
    }

    async fn update_transaction(&self, tx: &Transaction, expected: TransactionStatus) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let current: Transaction = self
            .get_json(CF_TRANSACTIONS, tx.id.0.as_bytes())?
            .ok_or_else(|| LedgerError::TransactionNotFound(tx.reference.clone()))?;
        if current.status != expected {
            return Err(LedgerError::ConcurrentModification(tx.reference.clone()));
        }
        self.db.put_cf(
            self.cf(CF_TRANSACTIONS)?,
            tx.id.0.as_bytes(),
            serde_json::to_vec(tx)?,
        )?;
        Ok(())
    }

    async fn transactions_with_status(&self, status: TransactionStatus) -> Result<Vec<Transaction>> {
        let mut found: Vec<Transaction> = self
            .scan::<Transaction>(CF_TRANSACTIONS)?
            .into_iter()
            .filter(|tx| tx.status == status)
            .collect();
        found.sort_by_key(|tx| tx.created_at);
        Ok(found)
    }

    async fn entries_for_transaction(&self, id: TransactionId) -> Result<Vec<LedgerEntry>> {
        self.entries_by_index(CF_TRANSACTION_INDEX, id.0.as_bytes())
    }

    async fn entries_for_wallet(&self, wallet: WalletId) -> Result<Vec<LedgerEntry>> {
        let mut entries = self.entries_by_index(CF_WALLET_INDEX, wallet.0.as_bytes())?;
        entries.reverse();
        Ok(entries)
    }
}

#[async_trait]
impl CommitBackend for RocksDBStore {
    async fn load_wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        self.get_json(CF_WALLETS, id.0.as_bytes())
    }

    async fn reference_taken(&self, reference: &str) -> Result<bool> {
        self.has_reference(reference)
    }

    async fn apply(&self, changes: ChangeSet) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut batch = WriteBatch::default();

        for tx in &changes.transactions {
            if self.has_reference(&tx.reference)? {
                return Err(LedgerError::DuplicateReference(tx.reference.clone()));
            }
            self.put_json(&mut batch, CF_TRANSACTIONS, tx.id.0.as_bytes(), tx)?;
            batch.put_cf(
                self.cf(CF_REFERENCES)?,
                tx.reference.as_bytes(),
                tx.id.0.as_bytes(),
            );
        }

        for (id, balance) in &changes.balances {
            let mut wallet: Wallet = self
                .get_json(CF_WALLETS, id.0.as_bytes())?
                .ok_or(LedgerError::WalletNotFound(*id))?;
            wallet.balance = *balance;
            self.put_json(&mut batch, CF_WALLETS, id.0.as_bytes(), &wallet)?;
        }

        for entry in &changes.entries {
            self.put_json(&mut batch, CF_ENTRIES, entry.id.as_bytes(), entry)?;
            batch.put_cf(self.cf(CF_WALLET_INDEX)?, wallet_index_key(entry), []);
            batch.put_cf(self.cf(CF_TRANSACTION_INDEX)?, transaction_index_key(entry), []);
        }

        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        Ok(Box::new(StagedUnitOfWork::new(
            self.clone(),
            self.locks.clone(),
        )))
    }
}
