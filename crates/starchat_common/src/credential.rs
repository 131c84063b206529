//! Verifiable credential payloads handed to the host for signing

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CREDENTIALS_V1_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

/// Proof format requested from the host's issuer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProofFormat {
    #[default]
    Jwt,
    Lds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    pub id: String,
}

/// Unsigned credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPayload {
    pub issuer: Issuer,
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    #[serde(rename = "type")]
    pub credential_type: Vec<String>,
    pub issuance_date: String,
    pub credential_subject: Value,
}

impl CredentialPayload {
    /// W3C v1 credential of `VerifiableCredential` plus one specific type
    pub fn new(issuer: &str, credential_type: &str, subject: Value, issued_at: DateTime<Utc>) -> Self {
        Self {
            issuer: Issuer {
                id: issuer.to_string(),
            },
            context: vec![CREDENTIALS_V1_CONTEXT.to_string()],
            credential_type: vec![
                "VerifiableCredential".to_string(),
                credential_type.to_string(),
            ],
            issuance_date: issued_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            credential_subject: subject,
        }
    }

    /// `id` of the credential subject, if any
    pub fn subject_id(&self) -> Option<&str> {
        self.credential_subject.get("id").and_then(|v| v.as_str())
    }
}

/// Signed credential as returned by the host; opaque to this crate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerifiableCredential(pub Value);

impl VerifiableCredential {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}
