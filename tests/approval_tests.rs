mod common;

use common::{Harness, amount, free_tiers, test_config};
use rust_decimal_macros::dec;
use wallet_ledger::application::withdrawal::WithdrawalRequest;
use wallet_ledger::config::LedgerConfig;
use wallet_ledger::domain::ports::Clock;
use wallet_ledger::domain::transaction::{Transaction, TransactionStatus};
use wallet_ledger::domain::user::Actor;
use wallet_ledger::domain::wallet::{Wallet, WalletType};
use wallet_ledger::error::LedgerError;

async fn held_withdrawal(h: &Harness) -> (Wallet, Transaction) {
    let (owner, wallet) = h.organizer("events-co", "+254711000000").await;
    h.fund(wallet.id, dec!(3000.00)).await;
    let tx = h
        .platform
        .withdrawals
        .withdraw(WithdrawalRequest {
            owner,
            wallet: wallet.id,
            amount: amount(dec!(2000.00)),
            destination: None,
        })
        .await
        .unwrap();
    (wallet, tx)
}

async fn harness() -> Harness {
    Harness::with_config(LedgerConfig {
        fee_tiers: free_tiers(),
        ..test_config()
    })
    .await
}

#[tokio::test]
async fn test_reject_refunds_source_wallet() {
    let h = harness().await;
    let (wallet, tx) = held_withdrawal(&h).await;
    assert_eq!(h.balance(wallet.id).await, dec!(1000.00));

    let rejected = h
        .platform
        .approvals
        .reject(&tx.reference, &Actor::System)
        .await
        .unwrap();

    assert_eq!(rejected.status, TransactionStatus::Rejected);
    assert_eq!(h.balance(wallet.id).await, dec!(3000.00));
    assert_eq!(h.system_balance(WalletType::Suspense).await, dec!(0));
    assert_eq!(h.entries(&format!("{}-RFD", tx.reference)).await.len(), 2);
    assert_eq!(h.rail.calls(), 0);

    // Terminal: a second rejection neither refunds nor changes state.
    let err = h
        .platform
        .approvals
        .reject(&tx.reference, &Actor::System)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    assert_eq!(h.balance(wallet.id).await, dec!(3000.00));
}

#[tokio::test]
async fn test_approved_transaction_cannot_be_rejected() {
    let h = harness().await;
    let (wallet, tx) = held_withdrawal(&h).await;
    h.platform
        .approvals
        .approve(&tx.reference, &Actor::System)
        .await
        .unwrap();

    let err = h
        .platform
        .approvals
        .reject(&tx.reference, &Actor::System)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InvalidTransition {
            from: TransactionStatus::Approved,
            to: TransactionStatus::Rejected,
            ..
        }
    ));
    assert_eq!(h.balance(wallet.id).await, dec!(1000.00));
    assert!(h.transaction(&format!("{}-RFD", tx.reference)).await.is_none());
}

#[tokio::test]
async fn test_hold_and_reapprove() {
    let h = harness().await;
    let (_, tx) = held_withdrawal(&h).await;
    let actor = Actor::Service("risk-desk".into());

    let approved = h.platform.approvals.approve(&tx.reference, &actor).await.unwrap();
    assert!(approved.scheduled_release_date.is_some());

    let held = h.platform.approvals.hold(&tx.reference, &actor).await.unwrap();
    assert_eq!(held.status, TransactionStatus::OnHold);
    assert_eq!(held.scheduled_release_date, None);

    h.clock.advance(chrono::Duration::hours(72));
    assert!(h.platform.payouts.run().await.unwrap().is_empty());

    let again = h.platform.approvals.approve(&tx.reference, &actor).await.unwrap();
    assert_eq!(again.status, TransactionStatus::Approved);
    assert_eq!(
        again.scheduled_release_date,
        Some(h.clock.now() + chrono::Duration::hours(48))
    );
}

#[tokio::test]
async fn test_completed_transaction_cannot_be_approved() {
    let h = harness().await;
    let (_, wallet) = h.customer("alice", "+254700000001").await;
    let deposit = h.fund(wallet.id, dec!(10.00)).await;

    let err = h
        .platform
        .approvals
        .approve(&deposit.reference, &Actor::System)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { .. }));

    let missing = h
        .platform
        .approvals
        .approve("WD-ORG-NOPE", &Actor::System)
        .await
        .unwrap_err();
    assert!(matches!(missing, LedgerError::TransactionNotFound(_)));
}

#[tokio::test]
async fn test_stale_status_write_is_refused() {
    let h = harness().await;
    let (_, tx) = held_withdrawal(&h).await;
    let mut stale = h.transaction(&tx.reference).await.unwrap();

    h.platform
        .approvals
        .hold(&tx.reference, &Actor::System)
        .await
        .unwrap();

    stale.status = TransactionStatus::Approved;
    let err = h
        .platform
        .repo
        .update_transaction(&stale, TransactionStatus::PendingApproval)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::ConcurrentModification(_)));
    assert_eq!(
        h.transaction(&tx.reference).await.unwrap().status,
        TransactionStatus::OnHold
    );
}

#[tokio::test]
async fn test_racing_approvals_apply_once() {
    let h = harness().await;
    let (_, tx) = held_withdrawal(&h).await;
    let first = Actor::Service("ops-a".into());
    let second = Actor::Service("ops-b".into());

    let (a, b) = tokio::join!(
        h.platform.approvals.approve(&tx.reference, &first),
        h.platform.approvals.approve(&tx.reference, &second),
    );

    let winner = match (a, b) {
        (Ok(_), Err(e)) => {
            assert!(matches!(
                e,
                LedgerError::ConcurrentModification(_) | LedgerError::InvalidTransition { .. }
            ));
            first
        }
        (Err(e), Ok(_)) => {
            assert!(matches!(
                e,
                LedgerError::ConcurrentModification(_) | LedgerError::InvalidTransition { .. }
            ));
            second
        }
        (a, b) => panic!("expected exactly one approval, got {a:?} and {b:?}"),
    };
    let stored = h.transaction(&tx.reference).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Approved);
    assert_eq!(stored.approved_by, Some(winner));
}

#[tokio::test]
async fn test_pending_lists_awaiting_decisions() {
    let h = harness().await;
    let (_, tx) = held_withdrawal(&h).await;

    let pending = h.platform.approvals.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].reference, tx.reference);

    h.platform
        .approvals
        .approve(&tx.reference, &Actor::System)
        .await
        .unwrap();
    assert!(h.platform.approvals.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejection_is_recorded_before_refund() {
    let h = harness().await;
    let (wallet, tx) = held_withdrawal(&h).await;

    // The refund cannot reach a frozen wallet, but the rejection still stands.
    h.platform.wallets.set_frozen(wallet.id, true).await.unwrap();
    let err = h
        .platform
        .approvals
        .reject(&tx.reference, &Actor::System)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::WalletFrozen(id) if id == wallet.id));
    assert_eq!(
        h.transaction(&tx.reference).await.unwrap().status,
        TransactionStatus::Rejected
    );

    let late = h
        .platform
        .approvals
        .approve(&tx.reference, &Actor::System)
        .await
        .unwrap_err();
    assert!(matches!(late, LedgerError::InvalidTransition { .. }));
    h.clock.advance(chrono::Duration::hours(49));
    assert!(h.platform.payouts.run().await.unwrap().is_empty());
    assert_eq!(h.rail.calls(), 0);
    assert_eq!(h.system_balance(WalletType::Suspense).await, dec!(2000.00));

    // Retrying the rejection finishes the refund exactly once.
    h.platform.wallets.set_frozen(wallet.id, false).await.unwrap();
    let rejected = h
        .platform
        .approvals
        .reject(&tx.reference, &Actor::System)
        .await
        .unwrap();
    assert_eq!(rejected.status, TransactionStatus::Rejected);
    assert_eq!(h.balance(wallet.id).await, dec!(3000.00));
    assert_eq!(h.system_balance(WalletType::Suspense).await, dec!(0));

    let again = h
        .platform
        .approvals
        .reject(&tx.reference, &Actor::System)
        .await
        .unwrap_err();
    assert!(matches!(again, LedgerError::InvalidTransition { .. }));
    assert_eq!(h.balance(wallet.id).await, dec!(3000.00));
}

#[tokio::test]
async fn test_racing_reject_and_approve_settle_once() {
    let h = harness().await;
    let (wallet, tx) = held_withdrawal(&h).await;

    let (rejected, approved) = tokio::join!(
        h.platform.approvals.reject(&tx.reference, &Actor::System),
        h.platform.approvals.approve(&tx.reference, &Actor::System),
    );
    assert!(rejected.is_ok() != approved.is_ok());

    h.clock.advance(chrono::Duration::hours(49));
    h.platform.payouts.run().await.unwrap();

    let refunded = h.transaction(&format!("{}-RFD", tx.reference)).await.is_some();
    let paid_out = !h.rail.payouts().is_empty();
    assert!(refunded != paid_out);
    assert_eq!(h.system_balance(WalletType::Suspense).await, dec!(0));
    let expected = if refunded { dec!(3000.00) } else { dec!(1000.00) };
    assert_eq!(h.balance(wallet.id).await, expected);
    assert!(h.platform.statements.reconcile().await.unwrap().is_empty());
}
