use crate::domain::money::Balance;
use crate::domain::ports::RepositoryRef;
use crate::domain::transaction::{
    EntryType, Transaction, TransactionId, TransactionStatus, TransactionType,
};
use crate::domain::wallet::{OwnerId, WalletId, WalletType};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryLine {
    pub reference: String,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub description: String,
    /// Credits positive, debits negative.
    pub amount: Decimal,
    pub balance_after: Balance,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPage {
    pub wallet: WalletId,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub lines: Vec<HistoryLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletSummary {
    pub wallet: WalletId,
    pub label: String,
    pub wallet_type: WalletType,
    pub currency: String,
    pub balance: Balance,
    /// Funds that left the wallet but are still held for approval or release.
    pub pending_payouts: Decimal,
    pub is_frozen: bool,
    pub is_primary: bool,
}

/// A wallet whose cached balance disagrees with its entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Drift {
    pub wallet: WalletId,
    pub wallet_type: WalletType,
    pub cached: Balance,
    pub ledger: Decimal,
}

/// Read side of the ledger.
pub struct StatementService {
    repo: RepositoryRef,
}

impl StatementService {
    pub fn new(repo: RepositoryRef) -> Self {
        Self { repo }
    }

    /// One page (1-based) of a wallet's history, newest first.
    pub async fn history(&self, wallet: WalletId, page: usize, page_size: usize) -> Result<HistoryPage> {
        if page == 0 || page_size == 0 {
            return Err(LedgerError::ValidationError(
                "page and page size start at 1".to_string(),
            ));
        }
        let offset = (page - 1).checked_mul(page_size).ok_or_else(|| {
            LedgerError::ValidationError(format!("page {page} of size {page_size} is out of range"))
        })?;
        if self.repo.wallet(wallet).await?.is_none() {
            return Err(LedgerError::WalletNotFound(wallet));
        }

        let entries = self.repo.entries_for_wallet(wallet).await?;
        let total = entries.len();
        let mut cache: HashMap<TransactionId, Transaction> = HashMap::new();
        let mut lines = Vec::new();

        for entry in entries.into_iter().skip(offset).take(page_size) {
            let tx = match cache.get(&entry.transaction_id) {
                Some(tx) => tx.clone(),
                None => {
                    let tx = self
                        .repo
                        .transaction(entry.transaction_id)
                        .await?
                        .ok_or_else(|| LedgerError::TransactionNotFound(entry.transaction_id.to_string()))?;
                    cache.insert(tx.id, tx.clone());
                    tx
                }
            };
            lines.push(HistoryLine {
                reference: tx.reference,
                transaction_type: tx.transaction_type,
                status: tx.status,
                description: tx.description,
                amount: entry.signed_amount(),
                balance_after: entry.balance_after,
                created_at: entry.created_at,
            });
        }

        Ok(HistoryPage {
            wallet,
            page,
            page_size,
            total,
            lines,
        })
    }

    /// Balances of every wallet an owner holds, with held outgoing funds.
    pub async fn summary(&self, owner: OwnerId) -> Result<Vec<WalletSummary>> {
        let mut summaries = Vec::new();
        for wallet in self.repo.wallets_of(owner).await? {
            let mut pending = Decimal::ZERO;
            for entry in self.repo.entries_for_wallet(wallet.id).await? {
                if entry.entry_type != EntryType::Debit {
                    continue;
                }
                if let Some(tx) = self.repo.transaction(entry.transaction_id).await?
                    && tx.status.is_held()
                {
                    pending += entry.amount.value();
                }
            }
            summaries.push(WalletSummary {
                wallet: wallet.id,
                label: wallet.label,
                wallet_type: wallet.wallet_type,
                currency: wallet.currency,
                balance: wallet.balance,
                pending_payouts: pending,
                is_frozen: wallet.is_frozen,
                is_primary: wallet.is_primary,
            });
        }
        Ok(summaries)
    }

    /// Every wallet whose cached balance differs from the sum of its entries.
    pub async fn reconcile(&self) -> Result<Vec<Drift>> {
        let mut drifts = Vec::new();
        for wallet in self.repo.all_wallets().await? {
            let ledger: Decimal = self
                .repo
                .entries_for_wallet(wallet.id)
                .await?
                .iter()
                .map(|entry| entry.signed_amount())
                .sum();
            if ledger != wallet.balance.value() {
                log::error!(
                    "Balance drift on {} wallet {}: cached {}, ledger {}",
                    wallet.wallet_type,
                    wallet.id,
                    wallet.balance,
                    ledger
                );
                drifts.push(Drift {
                    wallet: wallet.id,
                    wallet_type: wallet.wallet_type,
                    cached: wallet.balance,
                    ledger,
                });
            }
        }
        Ok(drifts)
    }
}
