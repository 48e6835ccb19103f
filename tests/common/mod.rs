#![allow(dead_code)]

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use wallet_ledger::application::platform::{Collaborators, Platform};
use wallet_ledger::config::LedgerConfig;
use wallet_ledger::domain::fee::FeeTier;
use wallet_ledger::domain::money::Amount;
use wallet_ledger::domain::ports::{PaymentRail, UserDirectory};
use wallet_ledger::domain::transaction::{LedgerEntry, Transaction};
use wallet_ledger::domain::user::UserProfile;
use wallet_ledger::domain::wallet::{OwnerId, Wallet, WalletId, WalletType};
use wallet_ledger::infrastructure::clock::ManualClock;
use wallet_ledger::infrastructure::in_memory::{InMemoryStore, InMemoryUserDirectory};
use wallet_ledger::infrastructure::notifier::RecordingNotifier;
use wallet_ledger::infrastructure::rails::SimulatedRail;
use wallet_ledger::infrastructure::webhook::RecordingWebhook;

/// Defaults with retries fast enough for tests.
pub fn test_config() -> LedgerConfig {
    LedgerConfig {
        rail_max_attempts: 2,
        rail_retry_delay_ms: 1,
        notification_retry_delay_ms: 1,
        ..LedgerConfig::default()
    }
}

/// One fee-free tier covering every amount.
pub fn free_tiers() -> Vec<FeeTier> {
    vec![FeeTier {
        min_amount: dec!(0.01),
        max_amount: dec!(1000000.00),
        service_fee: Decimal::ZERO,
        network_fee: Decimal::ZERO,
    }]
}

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

/// A platform over in-memory adapters, with handles to every test double.
pub struct Harness {
    pub platform: Platform,
    pub store: InMemoryStore,
    pub users: InMemoryUserDirectory,
    pub rail: Arc<SimulatedRail>,
    pub notifier: Arc<RecordingNotifier>,
    pub webhook: Arc<RecordingWebhook>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: LedgerConfig) -> Self {
        Self::with_ports(
            config,
            |users| Arc::new(users.clone()) as Arc<dyn UserDirectory>,
            |rail, _| rail.clone() as Arc<dyn PaymentRail>,
        )
        .await
    }

    /// Like [`Harness::with_config`], but lets a test wrap the user directory
    /// and the payment rail the platform sees.
    pub async fn with_ports<U, R>(config: LedgerConfig, users_port: U, rail_port: R) -> Self
    where
        U: FnOnce(&InMemoryUserDirectory) -> Arc<dyn UserDirectory>,
        R: FnOnce(&Arc<SimulatedRail>, &InMemoryStore) -> Arc<dyn PaymentRail>,
    {
        let store = InMemoryStore::new();
        let users = InMemoryUserDirectory::new();
        let rail = Arc::new(SimulatedRail::default());
        let notifier = Arc::new(RecordingNotifier::new());
        let webhook = Arc::new(RecordingWebhook::new());
        let clock = Arc::new(ManualClock::default());

        let platform = Platform::new(
            config,
            Collaborators {
                repo: Arc::new(store.clone()),
                users: users_port(&users),
                rail: rail_port(&rail, &store),
                notifier: notifier.clone(),
                webhook: Some(webhook.clone()),
                clock: clock.clone(),
            },
        )
        .unwrap();
        platform.wallets.bootstrap().await.unwrap();

        Self {
            platform,
            store,
            users,
            rail,
            notifier,
            webhook,
            clock,
        }
    }

    /// A KYC-verified customer with one personal wallet.
    pub async fn customer(&self, name: &str, phone: &str) -> (OwnerId, Wallet) {
        self.user_with_wallet(name, phone, WalletType::Customer).await
    }

    /// A KYC-verified organizer with a business wallet.
    pub async fn organizer(&self, name: &str, phone: &str) -> (OwnerId, Wallet) {
        self.user_with_wallet(name, phone, WalletType::Organizer).await
    }

    async fn user_with_wallet(&self, name: &str, phone: &str, wallet_type: WalletType) -> (OwnerId, Wallet) {
        let owner = self
            .users
            .register(
                UserProfile::new(name)
                    .with_phone(phone)
                    .with_email(format!("{name}@example.com"))
                    .verified(),
            )
            .await;
        let wallet = self
            .platform
            .wallets
            .create(Some(owner), wallet_type, None)
            .await
            .unwrap();
        (owner, wallet)
    }

    pub async fn fund(&self, wallet: WalletId, value: Decimal) -> Transaction {
        self.platform
            .collections
            .deposit(wallet, amount(value), None)
            .await
            .unwrap()
    }

    pub async fn balance(&self, wallet: WalletId) -> Decimal {
        self.platform.wallets.wallet(wallet).await.unwrap().balance.value()
    }

    pub async fn system_balance(&self, wallet_type: WalletType) -> Decimal {
        self.platform.wallets.system(wallet_type).await.unwrap().balance.value()
    }

    pub async fn transaction(&self, reference: &str) -> Option<Transaction> {
        self.platform.repo.transaction_by_reference(reference).await.unwrap()
    }

    pub async fn entries(&self, reference: &str) -> Vec<LedgerEntry> {
        let tx = self.transaction(reference).await.unwrap();
        self.platform.repo.entries_for_transaction(tx.id).await.unwrap()
    }

    /// Sum of every cached balance; zero while the books balance.
    pub async fn total_balance(&self) -> Decimal {
        self.platform
            .repo
            .all_wallets()
            .await
            .unwrap()
            .iter()
            .map(|w| w.balance.value())
            .sum()
    }
}
