use super::script_reader::{ScriptAction, ScriptRecord, WalletKind};
use crate::application::platform::Platform;
use crate::application::transfer::{TransferDestination, TransferRequest};
use crate::application::withdrawal::WithdrawalRequest;
use crate::domain::money::Amount;
use crate::domain::user::{Actor, KycStatus, UserProfile};
use crate::domain::wallet::{OwnerId, WalletId};
use crate::error::{LedgerError, Result};
use crate::infrastructure::clock::ManualClock;
use crate::infrastructure::in_memory::InMemoryUserDirectory;
use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::sync::Arc;

/// Replays an operations script against a [`Platform`].
///
/// Users and wallets are addressed by script-local names. Time only moves on
/// `advance` rows, so held payouts mature deterministically.
pub struct ScriptRunner<'a> {
    platform: &'a Platform,
    users: InMemoryUserDirectory,
    clock: Arc<ManualClock>,
    owners: HashMap<String, OwnerId>,
    wallets: HashMap<(String, String), WalletId>,
    last_reference: HashMap<String, String>,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(platform: &'a Platform, users: InMemoryUserDirectory, clock: Arc<ManualClock>) -> Self {
        Self {
            platform,
            users,
            clock,
            owners: HashMap::new(),
            wallets: HashMap::new(),
            last_reference: HashMap::new(),
        }
    }

    /// Script name of a wallet's owner.
    pub fn owner_name(&self, owner: OwnerId) -> Option<String> {
        self.owners
            .iter()
            .find(|(_, id)| **id == owner)
            .map(|(name, _)| name.clone())
    }

    fn user_name(record: &ScriptRecord) -> Result<&str> {
        record
            .user
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| LedgerError::ValidationError(format!("{:?} needs a user", record.action)))
    }

    fn owner(&self, record: &ScriptRecord) -> Result<OwnerId> {
        let name = Self::user_name(record)?;
        self.owners
            .get(name)
            .copied()
            .ok_or_else(|| LedgerError::UserNotFound(name.to_string()))
    }

    fn wallet_named(&self, user: &str, alias: &str) -> Result<WalletId> {
        self.wallets
            .get(&(user.to_string(), alias.to_string()))
            .copied()
            .ok_or_else(|| {
                LedgerError::ValidationError(format!("{user} has no wallet named '{alias}'"))
            })
    }

    fn wallet(&self, record: &ScriptRecord) -> Result<WalletId> {
        let user = Self::user_name(record)?;
        let alias = record
            .wallet
            .as_deref()
            .ok_or_else(|| LedgerError::ValidationError(format!("{:?} needs a wallet", record.action)))?;
        self.wallet_named(user, alias)
    }

    fn amount(record: &ScriptRecord) -> Result<Amount> {
        record
            .amount
            .ok_or_else(|| LedgerError::ValidationError(format!("{:?} needs an amount", record.action)))
            .and_then(Amount::new)
    }

    fn reference(&self, record: &ScriptRecord) -> Result<String> {
        if let Some(target) = record.target.as_deref().filter(|t| !t.is_empty()) {
            return Ok(target.to_string());
        }
        let user = Self::user_name(record)?;
        self.last_reference.get(user).cloned().ok_or_else(|| {
            LedgerError::ValidationError(format!("{user} has no transaction to act on"))
        })
    }

    /// Executes one row and returns a short description of the outcome.
    pub async fn execute(&mut self, record: ScriptRecord) -> Result<String> {
        let platform = self.platform;
        let operator = Actor::Service("script".to_string());

        match record.action {
            ScriptAction::Register => {
                let name = Self::user_name(&record)?.to_string();
                if self.owners.contains_key(&name) {
                    return Err(LedgerError::ValidationError(format!(
                        "user {name} already registered"
                    )));
                }
                let mut profile = UserProfile::new(name.clone());
                if let Some(contact) = record.target.as_deref() {
                    profile = if contact.contains('@') {
                        profile.with_email(contact)
                    } else {
                        profile.with_phone(contact)
                    };
                }
                let id = self.users.register(profile).await;
                self.owners.insert(name.clone(), id);
                Ok(format!("registered {name}"))
            }
            ScriptAction::Verify => {
                let owner = self.owner(&record)?;
                self.users.set_kyc(owner, KycStatus::Verified).await?;
                Ok(format!("verified {}", Self::user_name(&record)?))
            }
            ScriptAction::Open => {
                let owner = self.owner(&record)?;
                let user = Self::user_name(&record)?.to_string();
                let alias = record.wallet.clone().unwrap_or_else(|| "main".to_string());
                let kind: WalletKind = record
                    .target
                    .as_deref()
                    .map(str::parse::<WalletKind>)
                    .transpose()?
                    .unwrap_or(WalletKind::Customer);
                let wallet = platform
                    .wallets
                    .create(Some(owner), kind.into(), Some(alias.clone()))
                    .await?;
                self.wallets.insert((user.clone(), alias.clone()), wallet.id);
                Ok(format!("opened {} wallet '{alias}' for {user}", wallet.wallet_type))
            }
            ScriptAction::Deposit => {
                let tx = platform
                    .collections
                    .deposit(self.wallet(&record)?, Self::amount(&record)?, record.target.clone())
                    .await?;
                Ok(format!("{} {}", tx.reference, tx.status))
            }
            ScriptAction::Withdraw => {
                let tx = platform
                    .withdrawals
                    .withdraw(WithdrawalRequest {
                        owner: self.owner(&record)?,
                        wallet: self.wallet(&record)?,
                        amount: Self::amount(&record)?,
                        destination: record.target.clone(),
                    })
                    .await?;
                self.last_reference
                    .insert(Self::user_name(&record)?.to_string(), tx.reference.clone());
                Ok(format!("{} {}", tx.reference, tx.status))
            }
            ScriptAction::Transfer => {
                let user = Self::user_name(&record)?.to_string();
                let target = record
                    .target
                    .as_deref()
                    .ok_or_else(|| LedgerError::ValidationError("transfer needs a target".into()))?;
                let destination = match target.strip_prefix("wallet:") {
                    Some(alias) => TransferDestination::Wallet(self.wallet_named(&user, alias)?),
                    None => TransferDestination::Recipient(target.to_string()),
                };
                let tx = platform
                    .transfers
                    .transfer(TransferRequest {
                        owner: self.owner(&record)?,
                        source_wallet: self.wallet(&record)?,
                        destination,
                        amount: Self::amount(&record)?,
                    })
                    .await?;
                self.last_reference.insert(user, tx.reference.clone());
                Ok(format!("{} {}", tx.reference, tx.status))
            }
            ScriptAction::Sale => {
                let ticket = record
                    .target
                    .as_deref()
                    .ok_or_else(|| LedgerError::ValidationError("sale needs a ticket reference".into()))?;
                let tx = platform
                    .collections
                    .ticket_sale(self.owner(&record)?, Self::amount(&record)?, ticket)
                    .await?;
                Ok(format!("{} {}", tx.reference, tx.status))
            }
            ScriptAction::Approve => {
                let tx = platform
                    .approvals
                    .approve(&self.reference(&record)?, &operator)
                    .await?;
                Ok(format!("{} {}", tx.reference, tx.status))
            }
            ScriptAction::Hold => {
                let tx = platform
                    .approvals
                    .hold(&self.reference(&record)?, &operator)
                    .await?;
                Ok(format!("{} {}", tx.reference, tx.status))
            }
            ScriptAction::Reject => {
                let tx = platform
                    .approvals
                    .reject(&self.reference(&record)?, &operator)
                    .await?;
                Ok(format!("{} {}", tx.reference, tx.status))
            }
            ScriptAction::Freeze | ScriptAction::Unfreeze => {
                let frozen = record.action == ScriptAction::Freeze;
                let wallet = platform.wallets.set_frozen(self.wallet(&record)?, frozen).await?;
                Ok(format!("wallet {} frozen={}", wallet.label, wallet.is_frozen))
            }
            ScriptAction::Advance => {
                let hours = record.amount.unwrap_or(Decimal::ZERO);
                let minutes = (hours * Decimal::from(60))
                    .to_i64()
                    .filter(|m| *m >= 0)
                    .ok_or_else(|| {
                        LedgerError::ValidationError(format!("cannot advance by {hours} hours"))
                    })?;
                self.clock.advance(Duration::minutes(minutes));
                Ok(format!("clock advanced {hours}h"))
            }
            ScriptAction::Release => {
                let report = platform.payouts.run().await?;
                Ok(format!(
                    "released {}, failed {}, escalated {}",
                    report.released.len(),
                    report.failed.len(),
                    report.escalated.len()
                ))
            }
        }
    }
}
