mod common;

use common::{Harness, amount};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use wallet_ledger::application::ledger::LedgerPosting;
use wallet_ledger::application::transfer::{TransferDestination, TransferRequest};
use wallet_ledger::domain::transaction::{EntryRequest, TransactionType};
use wallet_ledger::error::LedgerError;

#[tokio::test]
async fn test_random_activity_conserves_balances() {
    let h = Harness::new().await;
    let mut rng = StdRng::seed_from_u64(7);

    let mut customers = Vec::new();
    for i in 0..6 {
        let phone = format!("+2547000000{i:02}");
        let (owner, wallet) = h.customer(&format!("user{i}"), &phone).await;
        customers.push((owner, wallet.id, phone));
    }

    for _ in 0..200 {
        let cents: i64 = rng.gen_range(1..=500_000);
        let value = Decimal::new(cents, 2);
        let from = rng.gen_range(0..customers.len());

        if rng.gen_range(0..3) == 0 {
            h.fund(customers[from].1, value).await;
        } else {
            let mut to = rng.gen_range(0..customers.len());
            if to == from {
                to = (to + 1) % customers.len();
            }
            let result = h
                .platform
                .transfers
                .transfer(TransferRequest {
                    owner: customers[from].0,
                    source_wallet: customers[from].1,
                    destination: TransferDestination::Recipient(customers[to].2.clone()),
                    amount: amount(value),
                })
                .await;
            if let Err(e) = result {
                assert!(matches!(e, LedgerError::InsufficientFunds { .. }), "unexpected error: {e}");
            }
        }

        assert_eq!(h.total_balance().await, Decimal::ZERO);
    }

    for (_, wallet, _) in &customers {
        assert!(h.balance(*wallet).await >= Decimal::ZERO);
    }
    assert!(h.platform.statements.reconcile().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cached_balance_matches_entries() {
    let h = Harness::new().await;
    let (_, wallet) = h.customer("alice", "+254700000001").await;
    h.fund(wallet.id, dec!(120.50)).await;
    h.fund(wallet.id, dec!(79.50)).await;

    let entries = h.platform.repo.entries_for_wallet(wallet.id).await.unwrap();
    let sum: Decimal = entries.iter().map(|e| e.signed_amount()).sum();
    assert_eq!(sum, dec!(200.00));
    assert_eq!(h.balance(wallet.id).await, sum);
    // Newest first, each entry carries the running balance.
    assert_eq!(entries[0].balance_after.value(), dec!(200.00));
    assert_eq!(entries[1].balance_after.value(), dec!(120.50));
}

#[tokio::test]
async fn test_guarded_debit_failure_leaves_no_trace() {
    let h = Harness::new().await;
    let (_, a) = h.customer("alice", "+254700000001").await;
    let (_, b) = h.customer("bob", "+254700000002").await;
    h.fund(a.id, dec!(50.00)).await;

    let err = h
        .platform
        .ledger
        .process(
            LedgerPosting::new("TRF-GUARDED", TransactionType::Transfer, "overdraw")
                .entry(EntryRequest::debit(a.id, amount(dec!(100.00))).guarded())
                .entry(EntryRequest::credit(b.id, amount(dec!(100.00)))),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    assert_eq!(h.balance(a.id).await, dec!(50.00));
    assert_eq!(h.balance(b.id).await, Decimal::ZERO);
    assert!(h.transaction("TRF-GUARDED").await.is_none());
}

#[tokio::test]
async fn test_replayed_receipt_is_rejected() {
    let h = Harness::new().await;
    let (_, wallet) = h.customer("alice", "+254700000001").await;

    h.platform
        .collections
        .deposit(wallet.id, amount(dec!(300.00)), Some("QK12ABC".into()))
        .await
        .unwrap();
    let err = h
        .platform
        .collections
        .deposit(wallet.id, amount(dec!(300.00)), Some("QK12ABC".into()))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::DuplicateReference(ref r) if r == "QK12ABC"));
    assert_eq!(h.balance(wallet.id).await, dec!(300.00));
    let tx = h.transaction("QK12ABC").await.unwrap();
    assert_eq!(tx.external_reference.as_deref(), Some("QK12ABC"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposing_transfers_do_not_deadlock() {
    let h = Arc::new(Harness::new().await);
    let (alice, a) = h.customer("alice", "+254700000001").await;
    let (bob, b) = h.customer("bob", "+254700000002").await;
    h.fund(a.id, dec!(1000.00)).await;
    h.fund(b.id, dec!(1000.00)).await;

    let mut tasks = Vec::new();
    for i in 0..100 {
        let h = h.clone();
        let (owner, source, recipient) = if i % 2 == 0 {
            (alice, a.id, "+254700000002")
        } else {
            (bob, b.id, "+254700000001")
        };
        tasks.push(tokio::spawn(async move {
            h.platform
                .transfers
                .transfer(TransferRequest {
                    owner,
                    source_wallet: source,
                    destination: TransferDestination::Recipient(recipient.to_string()),
                    amount: amount(dec!(5.00)),
                })
                .await
        }));
    }

    let all = async {
        for task in tasks {
            task.await.unwrap().unwrap();
        }
    };
    tokio::time::timeout(Duration::from_secs(10), all)
        .await
        .expect("transfers deadlocked");

    assert_eq!(h.balance(a.id).await, dec!(1000.00));
    assert_eq!(h.balance(b.id).await, dec!(1000.00));
    assert!(h.platform.statements.reconcile().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_debits_never_overdraw() {
    let h = Arc::new(Harness::new().await);
    let (alice, a) = h.customer("alice", "+254700000001").await;
    let (_, b) = h.customer("bob", "+254700000002").await;
    h.fund(a.id, dec!(100.00)).await;
    let source = a.id;

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            h.platform
                .transfers
                .transfer(TransferRequest {
                    owner: alice,
                    source_wallet: source,
                    destination: TransferDestination::Recipient("bob".to_string()),
                    amount: amount(dec!(10.00)),
                })
                .await
        }));
    }

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert!(matches!(e, LedgerError::InsufficientFunds { .. })),
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(h.balance(a.id).await, Decimal::ZERO);
    assert_eq!(h.balance(b.id).await, dec!(100.00));
}
