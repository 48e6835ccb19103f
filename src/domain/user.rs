use super::wallet::OwnerId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    #[default]
    Unverified,
    Verified,
    Rejected { reason: String },
}

impl KycStatus {
    pub fn is_verified(&self) -> bool {
        matches!(self, KycStatus::Verified)
    }
}

/// Profile data owned by the user directory.
///
/// The ledger only reads it: contact details for payouts and the KYC gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: OwnerId,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub kyc: KycStatus,
}

impl UserProfile {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: OwnerId::new(),
            username: username.into(),
            email: None,
            phone: None,
            kyc: KycStatus::Unverified,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn verified(mut self) -> Self {
        self.kyc = KycStatus::Verified;
        self
    }

    /// Email is compared case-insensitively, phone and username exactly.
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return false;
        }
        self.email
            .as_deref()
            .is_some_and(|email| email.eq_ignore_ascii_case(identifier))
            || self.phone.as_deref() == Some(identifier)
            || self.username == identifier
    }
}

/// Who performed an operator action, as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    User(OwnerId),
    Service(String),
    System,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::User(id) => write!(f, "user:{id}"),
            Actor::Service(name) => write!(f, "service:{name}"),
            Actor::System => f.write_str("system"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_matching() {
        let profile = UserProfile::new("wanjiru")
            .with_email("Wanjiru@Example.com")
            .with_phone("+254711000001");

        assert!(profile.matches_identifier("wanjiru@example.com"));
        assert!(profile.matches_identifier("  +254711000001 "));
        assert!(profile.matches_identifier("wanjiru"));
        assert!(!profile.matches_identifier("0711000001"));
        assert!(!profile.matches_identifier(""));
    }

    #[test]
    fn test_kyc_gate() {
        let profile = UserProfile::new("otieno");
        assert!(!profile.kyc.is_verified());
        assert!(profile.verified().kyc.is_verified());
        assert!(
            !KycStatus::Rejected {
                reason: "blurred id".to_string()
            }
            .is_verified()
        );
    }
}
