use crate::domain::wallet::{Wallet, WalletId, WalletType};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct WalletRow<'a> {
    owner: &'a str,
    wallet: WalletId,
    #[serde(rename = "type")]
    wallet_type: WalletType,
    label: &'a str,
    currency: &'a str,
    balance: String,
    frozen: bool,
}

/// Writes wallet balances as CSV.
pub struct WalletWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> WalletWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes one row per wallet. `owner_name` resolves the owner column;
    /// system wallets are listed as `system`.
    pub fn write_wallets<F>(&mut self, wallets: &[Wallet], owner_name: F) -> Result<()>
    where
        F: Fn(&Wallet) -> Option<String>,
    {
        for wallet in wallets {
            let owner = match wallet.owner {
                None => "system".to_string(),
                Some(id) => owner_name(wallet).unwrap_or_else(|| id.to_string()),
            };
            self.writer.serialize(WalletRow {
                owner: &owner,
                wallet: wallet.id,
                wallet_type: wallet.wallet_type,
                label: &wallet.label,
                currency: &wallet.currency,
                balance: wallet.balance.to_string(),
                frozen: wallet.is_frozen,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
