use super::approval::ApprovalService;
use super::collection::CollectionService;
use super::events::SettlementEvents;
use super::fees::FeeCalculator;
use super::ledger::LedgerEngine;
use super::notifications::{NotificationQueue, QueueSettings};
use super::payout::PayoutReleaseJob;
use super::rail::{RailClient, RailPolicy};
use super::statements::StatementService;
use super::transfer::TransferOrchestrator;
use super::wallets::WalletService;
use super::withdrawal::WithdrawalOrchestrator;
use crate::config::LedgerConfig;
use crate::domain::ports::{Clock, Notifier, PaymentRail, RepositoryRef, UserDirectory, WebhookEmitter};
use crate::error::Result;
use crate::infrastructure::webhook::DELIVERY_TIMEOUT;
use std::sync::Arc;

/// The ports a [`Platform`] is assembled from.
pub struct Collaborators {
    pub repo: RepositoryRef,
    pub users: Arc<dyn UserDirectory>,
    pub rail: Arc<dyn PaymentRail>,
    pub notifier: Arc<dyn Notifier>,
    pub webhook: Option<Arc<dyn WebhookEmitter>>,
    pub clock: Arc<dyn Clock>,
}

/// Every service of the ledger, wired from one configuration.
pub struct Platform {
    pub config: LedgerConfig,
    pub repo: RepositoryRef,
    pub clock: Arc<dyn Clock>,
    pub ledger: Arc<LedgerEngine>,
    pub fees: Arc<FeeCalculator>,
    pub wallets: Arc<WalletService>,
    pub transfers: TransferOrchestrator,
    pub withdrawals: WithdrawalOrchestrator,
    pub approvals: ApprovalService,
    pub payouts: Arc<PayoutReleaseJob>,
    pub collections: CollectionService,
    pub statements: StatementService,
    pub notifications: Arc<NotificationQueue>,
}

impl Platform {
    /// Builds the services. Must be called from within a tokio runtime because
    /// the notification workers are spawned here.
    pub fn new(config: LedgerConfig, parts: Collaborators) -> Result<Self> {
        config.validate()?;
        let Collaborators {
            repo,
            users,
            rail,
            notifier,
            webhook,
            clock,
        } = parts;

        let currency = config.currency.code.clone();
        let ledger = Arc::new(LedgerEngine::new(repo.clone(), clock.clone(), currency.clone()));
        let fees = Arc::new(FeeCalculator::new(config.fee_tiers.clone())?);
        let wallets = Arc::new(WalletService::new(
            repo.clone(),
            clock.clone(),
            currency,
            config.max_personal_wallets,
        ));
        let rail = Arc::new(RailClient::new(
            rail,
            RailPolicy {
                timeout: config.rail_timeout(),
                max_attempts: config.rail_max_attempts,
                retry_delay: config.rail_retry_delay(),
            },
        ));
        let notifications = Arc::new(NotificationQueue::start(
            notifier,
            QueueSettings {
                workers: config.notification_workers,
                capacity: config.notification_capacity,
                max_retries: config.notification_max_retries,
                retry_delay: config.notification_retry_delay(),
            },
        ));
        let events = Arc::new(SettlementEvents::new(
            webhook,
            config.webhook_types.clone(),
            DELIVERY_TIMEOUT,
        ));

        Ok(Self {
            transfers: TransferOrchestrator::new(
                repo.clone(),
                users.clone(),
                ledger.clone(),
                notifications.clone(),
            ),
            withdrawals: WithdrawalOrchestrator::new(
                repo.clone(),
                users,
                ledger.clone(),
                fees.clone(),
                rail.clone(),
                notifications.clone(),
                events.clone(),
                clock.clone(),
            ),
            approvals: ApprovalService::new(
                repo.clone(),
                ledger.clone(),
                clock.clone(),
                config.release_delay(),
            ),
            payouts: Arc::new(PayoutReleaseJob::new(
                repo.clone(),
                ledger.clone(),
                rail,
                clock.clone(),
                notifications.clone(),
                events.clone(),
                config.max_release_attempts,
            )),
            collections: CollectionService::new(
                wallets.clone(),
                ledger.clone(),
                events,
                config.ticket_commission_rate,
            ),
            statements: StatementService::new(repo.clone()),
            config,
            repo,
            clock,
            ledger,
            fees,
            wallets,
            notifications,
        })
    }

    /// Drains queued notifications.
    pub async fn shutdown(&self) {
        self.notifications.shutdown().await;
    }
}
