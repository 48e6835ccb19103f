use crate::domain::fee::FeeTier;
use crate::domain::transaction::TransactionType;
use crate::domain::wallet::Currency;
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: String,
}

/// Process-wide settings, built once at start-up and handed to every service.
///
/// Every field has a default so a JSON file only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub currency: Currency,
    pub fee_tiers: Vec<FeeTier>,
    /// Personal (CUSTOMER) wallets a single user may open.
    pub max_personal_wallets: usize,
    pub release_delay_hours: i64,
    /// Failed release attempts before a transaction is put on hold.
    pub max_release_attempts: u32,
    pub rail_timeout_secs: u64,
    pub rail_max_attempts: u32,
    pub rail_retry_delay_ms: u64,
    pub ticket_commission_rate: Decimal,
    pub notification_workers: usize,
    pub notification_max_retries: u32,
    pub notification_retry_delay_ms: u64,
    pub notification_capacity: usize,
    pub webhook: Option<WebhookConfig>,
    pub webhook_types: Vec<TransactionType>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            currency: Currency::default(),
            fee_tiers: default_fee_tiers(),
            max_personal_wallets: 5,
            release_delay_hours: 48,
            max_release_attempts: 5,
            rail_timeout_secs: 30,
            rail_max_attempts: 3,
            rail_retry_delay_ms: 500,
            ticket_commission_rate: dec!(0.04),
            notification_workers: 2,
            notification_max_retries: 3,
            notification_retry_delay_ms: 1_000,
            notification_capacity: 1_024,
            webhook: None,
            webhook_types: vec![TransactionType::TicketSale],
        }
    }
}

fn tier(min: Decimal, max: Decimal, service: Decimal, network: Decimal) -> FeeTier {
    FeeTier {
        min_amount: min,
        max_amount: max,
        service_fee: service,
        network_fee: network,
    }
}

/// Mobile-money withdrawal bands in KES.
pub fn default_fee_tiers() -> Vec<FeeTier> {
    vec![
        tier(dec!(0.01), dec!(500.00), dec!(0), dec!(0)),
        tier(dec!(500.01), dec!(1000.00), dec!(10.00), dec!(5.00)),
        tier(dec!(1000.01), dec!(5000.00), dec!(25.00), dec!(15.00)),
        tier(dec!(5000.01), dec!(20000.00), dec!(50.00), dec!(30.00)),
        tier(dec!(20000.01), dec!(150000.00), dec!(100.00), dec!(50.00)),
    ]
}

impl LedgerConfig {
    /// Loads a JSON configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: LedgerConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.currency.code.trim().is_empty() {
            return Err(LedgerError::Config("currency code must not be empty".into()));
        }
        if self.max_personal_wallets == 0 {
            return Err(LedgerError::Config("max_personal_wallets must be at least 1".into()));
        }
        if self.release_delay_hours < 0 {
            return Err(LedgerError::Config("release_delay_hours must not be negative".into()));
        }
        if self.max_release_attempts == 0 || self.rail_max_attempts == 0 {
            return Err(LedgerError::Config("attempt bounds must be at least 1".into()));
        }
        if self.ticket_commission_rate < Decimal::ZERO || self.ticket_commission_rate >= Decimal::ONE {
            return Err(LedgerError::Config(format!(
                "ticket_commission_rate {} must be in [0, 1)",
                self.ticket_commission_rate
            )));
        }
        if self.notification_workers == 0 || self.notification_capacity == 0 {
            return Err(LedgerError::Config(
                "notification workers and capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn release_delay(&self) -> chrono::Duration {
        chrono::Duration::hours(self.release_delay_hours)
    }

    pub fn rail_timeout(&self) -> Duration {
        Duration::from_secs(self.rail_timeout_secs)
    }

    pub fn rail_retry_delay(&self) -> Duration {
        Duration::from_millis(self.rail_retry_delay_ms)
    }

    pub fn notification_retry_delay(&self) -> Duration {
        Duration::from_millis(self.notification_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = LedgerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.currency.code, "KES");
        assert_eq!(config.max_personal_wallets, 5);
        assert_eq!(config.release_delay(), chrono::Duration::hours(48));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "release_delay_hours": 24, "webhook": {{ "url": "http://localhost:9000/hook", "secret": "k" }} }}"#
        )
        .unwrap();

        let config = LedgerConfig::from_path(file.path()).unwrap();
        assert_eq!(config.release_delay_hours, 24);
        assert_eq!(config.max_release_attempts, 5);
        assert_eq!(config.fee_tiers, default_fee_tiers());
        assert!(config.webhook.is_some());
    }

    #[test]
    fn test_invalid_commission_rejected() {
        let config = LedgerConfig {
            ticket_commission_rate: dec!(1.5),
            ..LedgerConfig::default()
        };
        assert!(matches!(config.validate(), Err(LedgerError::Config(_))));
    }
}
