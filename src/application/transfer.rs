use super::ledger::{LedgerEngine, LedgerPosting};
use super::notifications::{Notification, NotificationQueue};
use crate::domain::money::Amount;
use crate::domain::ports::{RepositoryRef, UserDirectory};
use crate::domain::transaction::{
    EntryRequest, Transaction, TransactionStatus, TransactionType, new_reference,
};
use crate::domain::user::UserProfile;
use crate::domain::wallet::{OwnerId, Wallet, WalletId, WalletType};
use crate::error::{LedgerError, Result};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferDestination {
    /// Another wallet of the same owner.
    Wallet(WalletId),
    /// Another user, by email, phone or username.
    Recipient(String),
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub owner: OwnerId,
    pub source_wallet: WalletId,
    pub destination: TransferDestination,
    pub amount: Amount,
}

/// Moves funds between wallets.
///
/// Customer wallets transfer instantly. Organizer wallets park the funds in
/// suspense until an operator approves and the release batch credits the
/// destination.
pub struct TransferOrchestrator {
    repo: RepositoryRef,
    users: Arc<dyn UserDirectory>,
    ledger: Arc<LedgerEngine>,
    notifications: Arc<NotificationQueue>,
}

impl TransferOrchestrator {
    pub fn new(
        repo: RepositoryRef,
        users: Arc<dyn UserDirectory>,
        ledger: Arc<LedgerEngine>,
        notifications: Arc<NotificationQueue>,
    ) -> Self {
        Self {
            repo,
            users,
            ledger,
            notifications,
        }
    }

    async fn owned_wallet(&self, owner: OwnerId, id: WalletId) -> Result<Wallet> {
        self.repo
            .wallet(id)
            .await?
            .filter(|w| w.is_owned_by(owner))
            .ok_or(LedgerError::WalletNotFound(id))
    }

    async fn resolve_destination(
        &self,
        owner: OwnerId,
        source: &Wallet,
        destination: &TransferDestination,
    ) -> Result<(Wallet, Option<UserProfile>)> {
        match destination {
            TransferDestination::Wallet(id) => {
                if *id == source.id {
                    return Err(LedgerError::ValidationError(
                        "source and destination wallet are the same".to_string(),
                    ));
                }
                Ok((self.owned_wallet(owner, *id).await?, None))
            }
            TransferDestination::Recipient(identifier) => {
                let identifier = identifier.trim();
                let recipient = self
                    .users
                    .find_by_identifier(identifier)
                    .await?
                    .ok_or_else(|| LedgerError::UserNotFound(identifier.to_string()))?;
                if recipient.id == owner {
                    return Err(LedgerError::SelfTransfer);
                }
                let wallet = self
                    .repo
                    .find_primary(recipient.id, WalletType::Customer)
                    .await?
                    .ok_or(LedgerError::NoReceivingWallet)?;
                Ok((wallet, Some(recipient)))
            }
        }
    }

    pub async fn transfer(&self, request: TransferRequest) -> Result<Transaction> {
        let source = self.owned_wallet(request.owner, request.source_wallet).await?;
        if source.is_frozen {
            return Err(LedgerError::WalletFrozen(source.id));
        }

        let (destination, recipient) = self
            .resolve_destination(request.owner, &source, &request.destination)
            .await?;
        if destination.is_frozen {
            return Err(LedgerError::WalletFrozen(destination.id));
        }
        if !source.balance.covers(request.amount) {
            return Err(LedgerError::InsufficientFunds {
                wallet: source.id,
                available: source.balance.value(),
                required: request.amount.value(),
            });
        }

        let debit = EntryRequest::debit(source.id, request.amount).guarded();
        let posting = match source.wallet_type {
            WalletType::Organizer => {
                let suspense = self
                    .repo
                    .system_wallet(WalletType::Suspense)
                    .await?
                    .ok_or(LedgerError::SystemWalletMissing(WalletType::Suspense))?;
                LedgerPosting::new(
                    new_reference("TRF-LOCK"),
                    TransactionType::Transfer,
                    format!("Held transfer to {}", destination.label),
                )
                .entry(debit)
                .entry(EntryRequest::credit(suspense.id, request.amount))
                .status(TransactionStatus::PendingApproval)
                .counterparty(destination.id)
            }
            WalletType::Customer => LedgerPosting::new(
                new_reference("TRF"),
                TransactionType::Transfer,
                match &recipient {
                    Some(profile) => format!("Transfer to {}", profile.username),
                    None => format!("Transfer to {}", destination.label),
                },
            )
            .entry(debit)
            .entry(EntryRequest::credit(destination.id, request.amount)),
            other => {
                return Err(LedgerError::ValidationError(format!(
                    "{other} wallets cannot initiate transfers"
                )));
            }
        };

        let posted = self.ledger.process(posting).await?;
        let tx = posted.transaction;

        if tx.status == TransactionStatus::Completed
            && let Some(phone) = recipient.as_ref().and_then(|r| r.phone.as_deref())
        {
            // Committed: a failed lookup only degrades the message.
            let sender = match self.users.user(request.owner).await {
                Ok(profile) => profile.map(|profile| profile.username),
                Err(e) => {
                    log::warn!("Sender lookup for {} failed: {e}", tx.reference);
                    None
                }
            }
            .unwrap_or_else(|| "another user".to_string());
            self.notifications.enqueue(Notification::message(
                phone,
                format!(
                    "You have received {} {} from {sender}. Ref {}",
                    self.ledger.currency(),
                    request.amount,
                    tx.reference
                ),
            ));
        }
        Ok(tx)
    }
}
