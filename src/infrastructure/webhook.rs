use crate::domain::ports::WebhookEmitter;
use crate::domain::transaction::TransactionStatus;
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

pub const SIGNATURE_HEADER: &str = "X-Yadi-Signature";
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(20);

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize)]
struct SettlementPayload<'a> {
    reference: &'a str,
    status: TransactionStatus,
}

/// Compact JSON body and its hex HMAC-SHA256 signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    pub body: String,
    pub signature: String,
}

pub fn signed_payload(reference: &str, status: TransactionStatus, secret: &str) -> Result<SignedPayload> {
    let body = serde_json::to_string(&SettlementPayload { reference, status })?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| LedgerError::Config(format!("invalid webhook secret: {e}")))?;
    mac.update(body.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(SignedPayload { body, signature })
}

/// Posts signed settlement callbacks to one configured URL.
pub struct HttpWebhookEmitter {
    client: Client,
    url: String,
    secret: String,
}

impl HttpWebhookEmitter {
    pub fn new(url: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::InternalError(Box::new(e)))?;
        Ok(Self {
            client,
            url: url.into(),
            secret: secret.into(),
        })
    }
}

#[async_trait]
impl WebhookEmitter for HttpWebhookEmitter {
    async fn emit(&self, reference: &str, status: TransactionStatus) -> Result<()> {
        let payload = signed_payload(reference, status, &self.secret)?;
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, &payload.signature)
            .body(payload.body)
            .send()
            .await
            .map_err(|e| LedgerError::InternalError(Box::new(e)))?;

        response
            .error_for_status()
            .map_err(|e| LedgerError::InternalError(Box::new(e)))?;
        log::debug!("Webhook delivered for {reference} ({status})");
        Ok(())
    }
}

/// Records emitted events in memory.
#[derive(Default)]
pub struct RecordingWebhook {
    events: Mutex<Vec<(String, TransactionStatus)>>,
}

impl RecordingWebhook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, TransactionStatus)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl WebhookEmitter for RecordingWebhook {
    async fn emit(&self, reference: &str, status: TransactionStatus) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((reference.to_string(), status));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_compact_json() {
        let payload = signed_payload("TKT-001", TransactionStatus::Completed, "s3cret").unwrap();
        assert_eq!(payload.body, r#"{"reference":"TKT-001","status":"COMPLETED"}"#);
    }

    #[test]
    fn test_signature_is_hex_hmac_sha256() {
        let payload = signed_payload("TKT-001", TransactionStatus::Completed, "s3cret").unwrap();
        assert_eq!(payload.signature.len(), 64);
        assert!(payload.signature.chars().all(|c| c.is_ascii_hexdigit()));

        let mut mac = HmacSha256::new_from_slice(b"s3cret").unwrap();
        mac.update(payload.body.as_bytes());
        assert!(mac.verify_slice(&hex::decode(&payload.signature).unwrap()).is_ok());

        let other = signed_payload("TKT-001", TransactionStatus::Completed, "other").unwrap();
        assert_ne!(payload.signature, other.signature);
    }
}
