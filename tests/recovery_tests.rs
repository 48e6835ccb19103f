mod common;

use async_trait::async_trait;
use common::{Harness, amount, test_config};
use rust_decimal_macros::dec;
use std::sync::Arc;
use wallet_ledger::application::transfer::{TransferDestination, TransferRequest};
use wallet_ledger::application::withdrawal::WithdrawalRequest;
use wallet_ledger::domain::money::Amount;
use wallet_ledger::domain::ports::{PaymentRail, TransactionStore, UserDirectory};
use wallet_ledger::domain::transaction::TransactionStatus;
use wallet_ledger::domain::user::UserProfile;
use wallet_ledger::domain::wallet::OwnerId;
use wallet_ledger::error::{LedgerError, Result};
use wallet_ledger::infrastructure::in_memory::{InMemoryStore, InMemoryUserDirectory};
use wallet_ledger::infrastructure::notifier::Delivered;
use wallet_ledger::infrastructure::rails::SimulatedRail;

/// Resolves recipients but cannot load profiles by id.
struct LookupOnlyDirectory(InMemoryUserDirectory);

#[async_trait]
impl UserDirectory for LookupOnlyDirectory {
    async fn user(&self, _id: OwnerId) -> Result<Option<UserProfile>> {
        Err(LedgerError::InternalError("directory offline".into()))
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserProfile>> {
        self.0.find_by_identifier(identifier).await
    }
}

/// Pays out, then lets another writer move the transaction before the caller
/// records the outcome.
struct ContendedRail {
    inner: Arc<SimulatedRail>,
    store: InMemoryStore,
}

#[async_trait]
impl PaymentRail for ContendedRail {
    async fn payout(&self, destination: &str, amount: Amount, reference: &str) -> Result<String> {
        let receipt = self.inner.payout(destination, amount, reference).await?;
        if let Some(mut tx) = self.store.transaction_by_reference(reference).await? {
            tx.status = TransactionStatus::Failed;
            self.store
                .update_transaction(&tx, TransactionStatus::Pending)
                .await?;
        }
        Ok(receipt)
    }

    fn name(&self) -> &str {
        "contended"
    }
}

#[tokio::test]
async fn test_committed_transfer_survives_sender_lookup_failure() {
    let h = Harness::with_ports(
        test_config(),
        |users| Arc::new(LookupOnlyDirectory(users.clone())) as Arc<dyn UserDirectory>,
        |rail, _| rail.clone() as Arc<dyn PaymentRail>,
    )
    .await;
    let (alice, source) = h.customer("alice", "+254700000001").await;
    let (_, target) = h.customer("bob", "+254700000002").await;
    h.fund(source.id, dec!(100.00)).await;

    let tx = h
        .platform
        .transfers
        .transfer(TransferRequest {
            owner: alice,
            source_wallet: source.id,
            destination: TransferDestination::Recipient("bob@example.com".into()),
            amount: amount(dec!(40.00)),
        })
        .await
        .unwrap();

    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(h.balance(source.id).await, dec!(60.00));
    assert_eq!(h.balance(target.id).await, dec!(40.00));

    h.platform.shutdown().await;
    assert!(h.notifier.delivered().iter().any(|d| matches!(
        d,
        Delivered::Message { recipient, text }
            if recipient == "+254700000002" && text.contains("another user")
    )));
}

#[tokio::test]
async fn test_paid_withdrawal_is_reported_when_status_write_fails() {
    let h = Harness::with_ports(
        test_config(),
        |users| Arc::new(users.clone()) as Arc<dyn UserDirectory>,
        |rail, store| {
            Arc::new(ContendedRail {
                inner: rail.clone(),
                store: store.clone(),
            }) as Arc<dyn PaymentRail>
        },
    )
    .await;
    let (owner, wallet) = h.customer("alice", "+254700000001").await;
    h.fund(wallet.id, dec!(300.00)).await;

    let tx = h
        .platform
        .withdrawals
        .withdraw(WithdrawalRequest {
            owner,
            wallet: wallet.id,
            amount: amount(dec!(300.00)),
            destination: None,
        })
        .await
        .unwrap();

    assert_eq!(tx.status, TransactionStatus::Completed);
    assert!(tx.external_reference.is_some());
    assert_eq!(h.rail.payouts().len(), 1);
    assert_eq!(h.balance(wallet.id).await, dec!(0));
    assert!(h.transaction(&format!("{}-REV", tx.reference)).await.is_none());
}
