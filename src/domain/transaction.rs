use super::money::{Amount, Balance};
use super::user::Actor;
use super::wallet::WalletId;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Generates a human-auditable reference such as `WD-ORG-1A2B3C4D`.
pub fn new_reference(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, id[..8].to_uppercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    TicketSale,
    Fee,
    Transfer,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::TicketSale => "TICKET_SALE",
            TransactionType::Fee => "FEE",
            TransactionType::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    PendingApproval,
    /// Approved, waiting for the scheduled release.
    Approved,
    /// Frozen for investigation.
    OnHold,
    Completed,
    Failed,
    /// Rejected and refunded.
    Rejected,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::PendingApproval => "PENDING_APPROVAL",
            TransactionStatus::Approved => "APPROVED",
            TransactionStatus::OnHold => "ON_HOLD",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Rejected
        )
    }

    /// Funds of a transaction in one of these states are still parked in suspense.
    pub fn is_held(self) -> bool {
        matches!(
            self,
            TransactionStatus::PendingApproval
                | TransactionStatus::Approved
                | TransactionStatus::OnHold
        )
    }

    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        match (self, next) {
            (Pending, PendingApproval | Completed | Rejected | Failed) => true,
            (PendingApproval, Approved | OnHold | Rejected | Failed) => true,
            (Approved, OnHold | Completed | Failed) => true,
            (OnHold, Approved | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(TransactionStatus::Pending),
            "PENDING_APPROVAL" => Ok(TransactionStatus::PendingApproval),
            "APPROVED" => Ok(TransactionStatus::Approved),
            "ON_HOLD" => Ok(TransactionStatus::OnHold),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            "REJECTED" => Ok(TransactionStatus::Rejected),
            other => Err(format!("unknown transaction status '{other}'")),
        }
    }
}

/// A ledger transaction header.
///
/// Only the status and approval fields change after creation, and only through
/// the transition methods below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub reference: String,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub is_approved: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Actor>,
    pub scheduled_release_date: Option<DateTime<Utc>>,
    /// Payment-rail receipt.
    pub external_reference: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Payout phone number for withdrawals.
    pub destination: Option<String>,
    /// Final destination of a held transfer.
    pub counterparty_wallet: Option<WalletId>,
    pub release_attempts: u32,
}

impl Transaction {
    pub fn new(
        reference: impl Into<String>,
        transaction_type: TransactionType,
        description: impl Into<String>,
        status: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            reference: reference.into(),
            transaction_type,
            status,
            description: description.into(),
            created_at: now,
            is_approved: false,
            approved_at: None,
            approved_by: None,
            scheduled_release_date: None,
            external_reference: None,
            completed_at: if status == TransactionStatus::Completed {
                Some(now)
            } else {
                None
            },
            destination: None,
            counterparty_wallet: None,
            release_attempts: 0,
        }
    }

    fn transition(&mut self, next: TransactionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::InvalidTransition {
                reference: self.reference.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Approves the transaction and schedules its release after `delay`.
    ///
    /// Also re-approves a transaction that was put on hold.
    pub fn approve(&mut self, actor: &Actor, now: DateTime<Utc>, delay: Duration) -> Result<()> {
        self.transition(TransactionStatus::Approved)?;
        self.is_approved = true;
        self.approved_at = Some(now);
        self.approved_by = Some(actor.clone());
        self.scheduled_release_date = Some(now + delay);
        Ok(())
    }

    pub fn hold(&mut self) -> Result<()> {
        self.transition(TransactionStatus::OnHold)?;
        self.scheduled_release_date = None;
        Ok(())
    }

    pub fn reject(&mut self) -> Result<()> {
        self.transition(TransactionStatus::Rejected)?;
        self.scheduled_release_date = None;
        Ok(())
    }

    pub fn fail(&mut self) -> Result<()> {
        self.transition(TransactionStatus::Failed)
    }

    pub fn complete(&mut self, external_reference: Option<String>, now: DateTime<Utc>) -> Result<()> {
        self.transition(TransactionStatus::Completed)?;
        if external_reference.is_some() {
            self.external_reference = external_reference;
        }
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TransactionStatus::Approved
            && self.scheduled_release_date.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    Debit,
    Credit,
}

impl EntryType {
    /// Signed effect on the wallet balance: credits add, debits subtract.
    pub fn signed(self, amount: Amount) -> Decimal {
        match self {
            EntryType::Debit => -amount.value(),
            EntryType::Credit => amount.value(),
        }
    }
}

/// One line of a committed transaction. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub transaction_id: TransactionId,
    pub wallet_id: WalletId,
    pub amount: Amount,
    pub entry_type: EntryType,
    /// Wallet balance immediately after this entry.
    pub balance_after: Balance,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn signed_amount(&self) -> Decimal {
        self.entry_type.signed(self.amount)
    }
}

/// An entry the caller wants posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRequest {
    pub wallet: WalletId,
    pub amount: Amount,
    pub entry_type: EntryType,
    /// Re-check under the wallet lock that the balance covers this debit.
    pub guard_funds: bool,
}

impl EntryRequest {
    pub fn debit(wallet: WalletId, amount: Amount) -> Self {
        Self {
            wallet,
            amount,
            entry_type: EntryType::Debit,
            guard_funds: false,
        }
    }

    pub fn credit(wallet: WalletId, amount: Amount) -> Self {
        Self {
            wallet,
            amount,
            entry_type: EntryType::Credit,
            guard_funds: false,
        }
    }

    pub fn guarded(mut self) -> Self {
        self.guard_funds = true;
        self
    }
}
