use super::money::{Amount, Balance};
use super::transaction::EntryType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WalletId(pub Uuid);

impl WalletId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WalletId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for WalletId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identity of a wallet owner as issued by the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub Uuid);

impl OwnerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletType {
    /// Personal wallet, instant transfers and withdrawals.
    Customer,
    /// Business wallet, outgoing funds are held for approval.
    Organizer,
    /// Mirror of the cash held at the payment provider.
    MasterLiquidity,
    Settlement,
    Revenue,
    /// Holding account for funds awaiting approval or release.
    Suspense,
    Reserve,
}

impl WalletType {
    pub const SYSTEM: [WalletType; 5] = [
        WalletType::MasterLiquidity,
        WalletType::Settlement,
        WalletType::Revenue,
        WalletType::Suspense,
        WalletType::Reserve,
    ];

    pub fn is_system(self) -> bool {
        !matches!(self, WalletType::Customer | WalletType::Organizer)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WalletType::Customer => "CUSTOMER",
            WalletType::Organizer => "ORGANIZER",
            WalletType::MasterLiquidity => "MASTER_LIQUIDITY",
            WalletType::Settlement => "SETTLEMENT",
            WalletType::Revenue => "REVENUE",
            WalletType::Suspense => "SUSPENSE",
            WalletType::Reserve => "RESERVE",
        }
    }

    pub fn default_label(self) -> &'static str {
        match self {
            WalletType::Customer => "Personal Wallet",
            WalletType::Organizer => "Business Wallet",
            WalletType::MasterLiquidity => "Liquidity Float",
            WalletType::Settlement => "Settlement (Incoming)",
            WalletType::Revenue => "Platform Revenue",
            WalletType::Suspense => "Suspense (Held Funds)",
            WalletType::Reserve => "Reserve",
        }
    }
}

impl fmt::Display for WalletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CUSTOMER" => Ok(WalletType::Customer),
            "ORGANIZER" => Ok(WalletType::Organizer),
            "MASTER" | "MASTER_LIQUIDITY" => Ok(WalletType::MasterLiquidity),
            "SETTLEMENT" => Ok(WalletType::Settlement),
            "REVENUE" => Ok(WalletType::Revenue),
            "SUSPENSE" => Ok(WalletType::Suspense),
            "RESERVE" => Ok(WalletType::Reserve),
            other => Err(format!("unknown wallet type '{other}'")),
        }
    }
}

/// Currency reference data. Immutable once configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub code: String,
    pub name: String,
    pub symbol: String,
}

impl Default for Currency {
    fn default() -> Self {
        Self {
            code: "KES".to_string(),
            name: "Kenyan Shilling".to_string(),
            symbol: "KSh".to_string(),
        }
    }
}

/// A wallet record.
///
/// `balance` is a cache of the signed sum of the wallet's ledger entries and is
/// only ever written by the ledger engine inside a unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    /// `None` for system-owned wallets.
    pub owner: Option<OwnerId>,
    pub currency: String,
    pub wallet_type: WalletType,
    pub balance: Balance,
    pub is_frozen: bool,
    pub label: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    pub fn system(wallet_type: WalletType, currency: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: WalletId::new(),
            owner: None,
            currency: currency.to_string(),
            wallet_type,
            balance: Balance::ZERO,
            is_frozen: false,
            label: wallet_type.default_label().to_string(),
            is_primary: true,
            created_at: now,
        }
    }

    pub fn personal(
        owner: OwnerId,
        wallet_type: WalletType,
        currency: &str,
        label: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: WalletId::new(),
            owner: Some(owner),
            currency: currency.to_string(),
            wallet_type,
            balance: Balance::ZERO,
            is_frozen: false,
            label: label.into(),
            is_primary: false,
            created_at: now,
        }
    }

    pub fn is_owned_by(&self, owner: OwnerId) -> bool {
        self.owner == Some(owner)
    }

    /// Applies one entry to the cached balance and returns the new balance.
    pub fn apply(&mut self, entry_type: EntryType, amount: Amount) -> Balance {
        match entry_type {
            EntryType::Debit => self.balance -= amount.into(),
            EntryType::Credit => self.balance += amount.into(),
        }
        self.balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_wallet_type_parsing() {
        assert_eq!("customer".parse::<WalletType>(), Ok(WalletType::Customer));
        assert_eq!("MASTER".parse::<WalletType>(), Ok(WalletType::MasterLiquidity));
        assert!("vault".parse::<WalletType>().is_err());
    }

    #[test]
    fn test_system_types() {
        assert!(WalletType::SYSTEM.iter().all(|t| t.is_system()));
        assert!(!WalletType::Customer.is_system());
        assert!(!WalletType::Organizer.is_system());
    }

    #[test]
    fn test_apply_entries() {
        let mut wallet = Wallet::system(WalletType::MasterLiquidity, "KES", Utc::now());
        let amount = Amount::new(dec!(1000.00)).unwrap();

        assert_eq!(
            wallet.apply(EntryType::Debit, amount),
            Balance::new(dec!(-1000.00))
        );
        assert_eq!(wallet.apply(EntryType::Credit, amount), Balance::ZERO);
    }

    #[test]
    fn test_wallet_type_serializes_screaming() {
        let json = serde_json::to_string(&WalletType::MasterLiquidity).unwrap();
        assert_eq!(json, "\"MASTER_LIQUIDITY\"");
    }
}
