use crate::domain::transaction::TransactionStatus;
use crate::domain::wallet::{WalletId, WalletType};
use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger imbalance: debits {debits} != credits {credits}")]
    LedgerImbalance { debits: Decimal, credits: Decimal },

    #[error("Insufficient funds in wallet {wallet}: balance {available}, required {required}")]
    InsufficientFunds {
        wallet: WalletId,
        available: Decimal,
        required: Decimal,
    },

    #[error("Identity verification required before withdrawing funds")]
    KycRequired,

    #[error("Wallet {0} is frozen")]
    WalletFrozen(WalletId),

    #[error("Wallet {0} not found")]
    WalletNotFound(WalletId),

    #[error("{0} wallet has not been initialised")]
    SystemWalletMissing(WalletType),

    #[error("Wallet limit reached for {wallet_type} wallets (max {limit})")]
    WalletLimitExceeded { wallet_type: WalletType, limit: usize },

    #[error("Recipient has no active wallet to receive funds")]
    NoReceivingWallet,

    #[error("User '{0}' not found")]
    UserNotFound(String),

    #[error("For self-transfers, move funds between your own wallets")]
    SelfTransfer,

    #[error("Payment rail failure: {0}")]
    PaymentRailFailure(String),

    #[error("Payout {0} was not confirmed by the payment rail")]
    PayoutUnconfirmed(String),

    #[error("Duplicate transaction reference: {0}")]
    DuplicateReference(String),

    #[error("Transaction {0} not found")]
    TransactionNotFound(String),

    #[error("Transaction {reference} cannot move from {from} to {to}")]
    InvalidTransition {
        reference: String,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Transaction {0} was modified concurrently")]
    ConcurrentModification(String),

    #[error("Currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: String, found: String },

    #[error("Wallet {requested} locked out of order after {held}")]
    LockOrderViolation { held: WalletId, requested: WalletId },

    #[error("Invalid fee schedule: {0}")]
    InvalidFeeSchedule(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),

    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
}

impl LedgerError {
    /// Errors raised by a pre-condition check; no ledger state was touched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::InsufficientFunds { .. }
                | LedgerError::KycRequired
                | LedgerError::WalletFrozen(_)
                | LedgerError::WalletNotFound(_)
                | LedgerError::WalletLimitExceeded { .. }
                | LedgerError::NoReceivingWallet
                | LedgerError::UserNotFound(_)
                | LedgerError::SelfTransfer
                | LedgerError::ValidationError(_)
        )
    }
}
