use super::events::SettlementEvents;
use super::ledger::{LedgerEngine, LedgerPosting};
use super::wallets::WalletService;
use crate::domain::money::{Amount, MONEY_SCALE};
use crate::domain::transaction::{EntryRequest, Transaction, TransactionType, new_reference};
use crate::domain::wallet::{OwnerId, WalletId, WalletType};
use crate::error::{LedgerError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;

/// Money entering the platform: wallet top-ups and ticket sales.
///
/// Both are funded from the master liquidity wallet, which mirrors the cash
/// received at the payment provider and therefore goes negative.
pub struct CollectionService {
    wallets: Arc<WalletService>,
    ledger: Arc<LedgerEngine>,
    events: Arc<SettlementEvents>,
    commission_rate: Decimal,
}

impl CollectionService {
    pub fn new(
        wallets: Arc<WalletService>,
        ledger: Arc<LedgerEngine>,
        events: Arc<SettlementEvents>,
        commission_rate: Decimal,
    ) -> Self {
        Self {
            wallets,
            ledger,
            events,
            commission_rate,
        }
    }

    /// Credits a confirmed deposit. The provider receipt, when given, becomes
    /// the transaction reference so a replayed callback is rejected as a
    /// duplicate.
    pub async fn deposit(
        &self,
        wallet: WalletId,
        amount: Amount,
        receipt: Option<String>,
    ) -> Result<Transaction> {
        let target = self.wallets.wallet(wallet).await?;
        if target.wallet_type.is_system() {
            return Err(LedgerError::ValidationError(format!(
                "cannot deposit into the {} wallet",
                target.wallet_type
            )));
        }
        if target.is_frozen {
            return Err(LedgerError::WalletFrozen(target.id));
        }
        let master = self.wallets.system(WalletType::MasterLiquidity).await?;

        let mut posting = LedgerPosting::new(
            receipt.clone().unwrap_or_else(|| new_reference("DEP")),
            TransactionType::Deposit,
            format!("Deposit to {}", target.label),
        )
        .entry(EntryRequest::debit(master.id, amount))
        .entry(EntryRequest::credit(target.id, amount));
        if let Some(receipt) = receipt {
            posting = posting.external_reference(receipt);
        }

        let posted = self.ledger.process(posting).await?;
        self.events.settled(&posted.transaction).await;
        Ok(posted.transaction)
    }

    /// Platform commission on a ticket sale, rounded half away from zero.
    pub fn commission(&self, amount: Amount) -> Decimal {
        (amount.value() * self.commission_rate)
            .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Splits a ticket payment between the organizer and platform revenue,
    /// then announces the settlement.
    pub async fn ticket_sale(
        &self,
        organizer: OwnerId,
        amount: Amount,
        ticket_reference: &str,
    ) -> Result<Transaction> {
        let wallet = self.wallets.ensure(organizer, WalletType::Organizer).await?;
        let master = self.wallets.system(WalletType::MasterLiquidity).await?;
        let revenue = self.wallets.system(WalletType::Revenue).await?;

        let commission = self.commission(amount);
        let net = Amount::new(amount.value() - commission)?;

        let mut posting = LedgerPosting::new(
            ticket_reference,
            TransactionType::TicketSale,
            format!("Ticket sale {ticket_reference}"),
        )
        .entry(EntryRequest::debit(master.id, amount))
        .entry(EntryRequest::credit(wallet.id, net));
        if let Some(fee) = Amount::non_zero(commission)? {
            posting = posting.entry(EntryRequest::credit(revenue.id, fee));
        }

        let posted = self.ledger.process(posting).await?;
        self.events.settled(&posted.transaction).await;
        Ok(posted.transaction)
    }
}
