use crate::domain::wallet::WalletType;
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptAction {
    /// Register a user; `target` is a phone number or an email.
    Register,
    Verify,
    /// Open a wallet; `target` is the wallet kind.
    Open,
    Deposit,
    Withdraw,
    Transfer,
    /// Ticket sale for an organizer; `target` is the ticket reference.
    Sale,
    Approve,
    Hold,
    Reject,
    Freeze,
    Unfreeze,
    /// Move the clock forward by `amount` hours.
    Advance,
    Release,
}

/// Wallet kinds a script may open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletKind {
    Customer,
    Organizer,
}

impl From<WalletKind> for WalletType {
    fn from(kind: WalletKind) -> Self {
        match kind {
            WalletKind::Customer => WalletType::Customer,
            WalletKind::Organizer => WalletType::Organizer,
        }
    }
}

impl std::str::FromStr for WalletKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(WalletKind::Customer),
            "organizer" => Ok(WalletKind::Organizer),
            other => Err(LedgerError::ValidationError(format!(
                "unknown wallet kind '{other}'"
            ))),
        }
    }
}

/// One row of an operations script: `action,user,wallet,amount,target`.
///
/// `user` and `wallet` are names local to the script; the runner maps them
/// to owner and wallet ids.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptRecord {
    pub action: ScriptAction,
    pub user: Option<String>,
    pub wallet: Option<String>,
    pub amount: Option<Decimal>,
    pub target: Option<String>,
}

/// Reads script rows from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths,
/// so trailing empty columns may be omitted.
pub struct ScriptReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ScriptReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows; a malformed row yields an error and the
    /// iterator moves on.
    pub fn records(self) -> impl Iterator<Item = Result<ScriptRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LedgerError::from))
    }
}
