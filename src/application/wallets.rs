use crate::domain::ports::{Clock, RepositoryRef};
use crate::domain::wallet::{OwnerId, Wallet, WalletId, WalletType};
use crate::error::{LedgerError, Result};
use std::sync::Arc;

/// Wallet lifecycle: opening, system bootstrap and freezing.
pub struct WalletService {
    repo: RepositoryRef,
    clock: Arc<dyn Clock>,
    currency: String,
    max_personal_wallets: usize,
}

impl WalletService {
    pub fn new(
        repo: RepositoryRef,
        clock: Arc<dyn Clock>,
        currency: impl Into<String>,
        max_personal_wallets: usize,
    ) -> Self {
        Self {
            repo,
            clock,
            currency: currency.into(),
            max_personal_wallets,
        }
    }

    fn cap(&self, wallet_type: WalletType) -> usize {
        match wallet_type {
            WalletType::Customer => self.max_personal_wallets,
            _ => 1,
        }
    }

    /// Opens a new wallet. System wallets take no owner, user wallets need one.
    pub async fn create(
        &self,
        owner: Option<OwnerId>,
        wallet_type: WalletType,
        label: Option<String>,
    ) -> Result<Wallet> {
        let now = self.clock.now();
        let wallet = match (owner, wallet_type.is_system()) {
            (None, true) => Wallet::system(wallet_type, &self.currency, now),
            (Some(owner), false) => Wallet::personal(
                owner,
                wallet_type,
                &self.currency,
                label.unwrap_or_else(|| wallet_type.default_label().to_string()),
                now,
            ),
            (Some(_), true) => {
                return Err(LedgerError::ValidationError(format!(
                    "{wallet_type} wallets are system-owned"
                )));
            }
            (None, false) => {
                return Err(LedgerError::ValidationError(format!(
                    "{wallet_type} wallets need an owner"
                )));
            }
        };

        let created = self.repo.create_wallet(wallet, self.cap(wallet_type)).await?;
        log::info!(
            "Opened {} wallet {} ({})",
            created.wallet_type,
            created.id,
            created.label
        );
        Ok(created)
    }

    /// Returns the owner's primary wallet of a type, opening it if needed.
    pub async fn ensure(&self, owner: OwnerId, wallet_type: WalletType) -> Result<Wallet> {
        if let Some(wallet) = self.repo.find_primary(owner, wallet_type).await? {
            return Ok(wallet);
        }
        match self.create(Some(owner), wallet_type, None).await {
            Err(LedgerError::WalletLimitExceeded { .. }) => self
                .repo
                .find_primary(owner, wallet_type)
                .await?
                .ok_or(LedgerError::NoReceivingWallet),
            other => other,
        }
    }

    /// Get-or-create of every system wallet. Safe to run repeatedly.
    pub async fn bootstrap(&self) -> Result<Vec<Wallet>> {
        let mut wallets = Vec::with_capacity(WalletType::SYSTEM.len());
        for wallet_type in WalletType::SYSTEM {
            let wallet = match self.repo.system_wallet(wallet_type).await? {
                Some(existing) => existing,
                None => match self.create(None, wallet_type, None).await {
                    Err(LedgerError::WalletLimitExceeded { .. }) => self
                        .repo
                        .system_wallet(wallet_type)
                        .await?
                        .ok_or(LedgerError::SystemWalletMissing(wallet_type))?,
                    other => other?,
                },
            };
            wallets.push(wallet);
        }
        Ok(wallets)
    }

    pub async fn wallet(&self, id: WalletId) -> Result<Wallet> {
        self.repo
            .wallet(id)
            .await?
            .ok_or(LedgerError::WalletNotFound(id))
    }

    pub async fn system(&self, wallet_type: WalletType) -> Result<Wallet> {
        self.repo
            .system_wallet(wallet_type)
            .await?
            .ok_or(LedgerError::SystemWalletMissing(wallet_type))
    }

    pub async fn wallets_of(&self, owner: OwnerId) -> Result<Vec<Wallet>> {
        self.repo.wallets_of(owner).await
    }

    pub async fn set_frozen(&self, id: WalletId, frozen: bool) -> Result<Wallet> {
        let wallet = self.repo.set_frozen(id, frozen).await?;
        log::warn!(
            "Wallet {} {}",
            id,
            if frozen { "frozen" } else { "unfrozen" }
        );
        Ok(wallet)
    }
}
