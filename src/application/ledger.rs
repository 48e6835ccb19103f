use crate::domain::ports::{Clock, RepositoryRef};
use crate::domain::transaction::{
    EntryRequest, EntryType, LedgerEntry, Transaction, TransactionStatus, TransactionType,
};
use crate::domain::wallet::{Wallet, WalletId};
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// A balanced set of entries to be posted as one transaction.
#[derive(Debug, Clone)]
pub struct LedgerPosting {
    pub reference: String,
    pub description: String,
    pub transaction_type: TransactionType,
    pub entries: Vec<EntryRequest>,
    pub status: TransactionStatus,
    pub destination: Option<String>,
    pub counterparty_wallet: Option<WalletId>,
    pub external_reference: Option<String>,
    /// Undoes an earlier posting and may therefore touch frozen wallets.
    pub compensating: bool,
}

impl LedgerPosting {
    pub fn new(
        reference: impl Into<String>,
        transaction_type: TransactionType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            reference: reference.into(),
            description: description.into(),
            transaction_type,
            entries: Vec::new(),
            status: TransactionStatus::Completed,
            destination: None,
            counterparty_wallet: None,
            external_reference: None,
            compensating: false,
        }
    }

    pub fn entry(mut self, entry: EntryRequest) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn entries(mut self, entries: impl IntoIterator<Item = EntryRequest>) -> Self {
        self.entries.extend(entries);
        self
    }

    pub fn status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn counterparty(mut self, wallet: WalletId) -> Self {
        self.counterparty_wallet = Some(wallet);
        self
    }

    pub fn external_reference(mut self, external_reference: impl Into<String>) -> Self {
        self.external_reference = Some(external_reference.into());
        self
    }

    pub fn compensating(mut self) -> Self {
        self.compensating = true;
        self
    }
}

/// The committed result of [`LedgerEngine::process`].
#[derive(Debug, Clone)]
pub struct PostedTransaction {
    pub transaction: Transaction,
    pub entries: Vec<LedgerEntry>,
}

/// Atomic, balance-conserving transaction processor.
///
/// `LedgerEngine` is the only writer of wallet balances. Every call runs in its
/// own unit of work: it locks every wallet touched (ascending wallet id, all
/// before the first mutation), applies the entries, and commits only when
/// debits equal credits. Any error drops the unit, so nothing is persisted.
///
/// Frozen customer and organizer wallets are refused under the lock, so a
/// freeze that lands after a caller's own checks still stops the posting.
/// Compensating postings are exempt.
pub struct LedgerEngine {
    repo: RepositoryRef,
    clock: Arc<dyn Clock>,
    currency: String,
}

impl LedgerEngine {
    pub fn new(repo: RepositoryRef, clock: Arc<dyn Clock>, currency: impl Into<String>) -> Self {
        Self {
            repo,
            clock,
            currency: currency.into(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Posts a transaction and its entries atomically.
    ///
    /// # Errors
    ///
    /// * `DuplicateReference` - the reference is already used.
    /// * `LedgerImbalance` - debits and credits differ.
    /// * `InsufficientFunds` - a funds-guarded debit is not covered under lock.
    /// * `WalletFrozen` - a user wallet was frozen and the posting is not compensating.
    /// * `WalletNotFound` / `CurrencyMismatch` - an entry targets an unusable wallet.
    pub async fn process(&self, posting: LedgerPosting) -> Result<PostedTransaction> {
        if posting.entries.is_empty() {
            return Err(LedgerError::ValidationError(format!(
                "transaction {} has no entries",
                posting.reference
            )));
        }
        if self
            .repo
            .transaction_by_reference(&posting.reference)
            .await?
            .is_some()
        {
            return Err(LedgerError::DuplicateReference(posting.reference));
        }

        let now = self.clock.now();
        let mut transaction = Transaction::new(
            posting.reference.clone(),
            posting.transaction_type,
            posting.description.clone(),
            posting.status,
            now,
        );
        transaction.destination = posting.destination.clone();
        transaction.counterparty_wallet = posting.counterparty_wallet;
        transaction.external_reference = posting.external_reference.clone();

        let mut unit = self.repo.begin().await?;
        unit.insert_transaction(transaction.clone()).await?;

        let mut lock_order: Vec<WalletId> = posting.entries.iter().map(|e| e.wallet).collect();
        lock_order.sort();
        lock_order.dedup();

        let mut wallets: BTreeMap<WalletId, Wallet> = BTreeMap::new();
        for id in lock_order {
            let wallet = unit.lock_for_update(id).await?;
            if wallet.currency != self.currency {
                return Err(LedgerError::CurrencyMismatch {
                    expected: self.currency.clone(),
                    found: wallet.currency,
                });
            }
            if wallet.is_frozen && !wallet.wallet_type.is_system() && !posting.compensating {
                return Err(LedgerError::WalletFrozen(id));
            }
            wallets.insert(id, wallet);
        }

        let mut debits = Decimal::ZERO;
        let mut credits = Decimal::ZERO;
        let mut entries = Vec::with_capacity(posting.entries.len());

        for request in &posting.entries {
            let wallet = wallets
                .get_mut(&request.wallet)
                .ok_or(LedgerError::WalletNotFound(request.wallet))?;

            if request.guard_funds
                && request.entry_type == EntryType::Debit
                && !wallet.balance.covers(request.amount)
            {
                return Err(LedgerError::InsufficientFunds {
                    wallet: wallet.id,
                    available: wallet.balance.value(),
                    required: request.amount.value(),
                });
            }

            let balance_after = wallet.apply(request.entry_type, request.amount);
            match request.entry_type {
                EntryType::Debit => debits += request.amount.value(),
                EntryType::Credit => credits += request.amount.value(),
            }

            let entry = LedgerEntry {
                id: Uuid::new_v4(),
                transaction_id: transaction.id,
                wallet_id: request.wallet,
                amount: request.amount,
                entry_type: request.entry_type,
                balance_after,
                created_at: now,
            };
            unit.insert_entry(entry.clone())?;
            entries.push(entry);
        }

        if debits != credits {
            log::warn!(
                "Rejected imbalanced transaction {}: debits {debits}, credits {credits}",
                posting.reference
            );
            return Err(LedgerError::LedgerImbalance { debits, credits });
        }

        for (id, wallet) in &wallets {
            unit.set_balance(*id, wallet.balance)?;
        }
        unit.commit().await?;

        log::info!(
            "Posted {} {} ({}) amount {:.2} across {} entries",
            transaction.transaction_type,
            transaction.reference,
            transaction.status,
            debits,
            entries.len()
        );
        Ok(PostedTransaction {
            transaction,
            entries,
        })
    }
}
