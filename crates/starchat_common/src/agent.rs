//! Host Agent Trait Abstraction
//!
//! The handlers never sign, encrypt or transmit anything themselves. The
//! host identity agent provides those capabilities through `HostAgent`.
//!
//! Production code plugs in an adapter over the real agent. Test code uses
//! `FakeAgent`, which records every call and can be told to fail.

use crate::credential::{CredentialPayload, ProofFormat, VerifiableCredential};
use crate::error::AgentError;
use crate::message::DidCommMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Mutex, MutexGuard};

// ============================================================================
// Collaborator Contract
// ============================================================================

/// DIDComm packing scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PackingMode {
    /// Authenticated encryption (sender is known to the recipient)
    #[default]
    Authcrypt,
    Anoncrypt,
    Jws,
    None,
}

impl PackingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackingMode::Authcrypt => "authcrypt",
            PackingMode::Anoncrypt => "anoncrypt",
            PackingMode::Jws => "jws",
            PackingMode::None => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackArgs {
    pub message: DidCommMessage,
    pub packing: PackingMode,
}

/// Transport-ready packed message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedMessage {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendArgs {
    pub message_id: String,
    pub packed_message: PackedMessage,
    pub recipient_did_url: String,
}

/// What the host reports after dispatching a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub transport_id: String,
}

/// Capabilities consumed from the host identity agent
#[async_trait]
pub trait HostAgent: Send + Sync {
    /// Sign a credential
    async fn create_verifiable_credential(
        &self,
        credential: CredentialPayload,
        proof_format: ProofFormat,
    ) -> Result<VerifiableCredential, AgentError>;

    /// Encrypt/sign a plaintext message for transport
    async fn pack_didcomm_message(&self, args: PackArgs) -> Result<PackedMessage, AgentError>;

    /// Send a packed message to the recipient's service endpoint
    async fn send_didcomm_message(&self, args: SendArgs) -> Result<SendResult, AgentError>;
}

// ============================================================================
// Fake Agent (Testing)
// ============================================================================

/// Which collaborator call the fake should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFailure {
    Issue,
    Pack,
    Send,
}

#[derive(Default)]
struct FakeAgentState {
    issued: Vec<(CredentialPayload, ProofFormat)>,
    packed: Vec<PackArgs>,
    sent: Vec<SendArgs>,
}

/// In-memory host agent
///
/// Credentials come back with a fake proof, packing is a JSON envelope
/// around the plaintext (see `FakeAgent::unpack`), and dispatch just
/// records the arguments.
#[derive(Default)]
pub struct FakeAgent {
    state: Mutex<FakeAgentState>,
    failure: Option<FakeFailure>,
}

impl FakeAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fake that fails the given call every time
    pub fn failing(failure: FakeFailure) -> Self {
        Self {
            state: Mutex::default(),
            failure: Some(failure),
        }
    }

    /// Recover the plaintext from a message packed by this fake
    pub fn unpack(packed: &PackedMessage) -> Option<DidCommMessage> {
        let envelope: serde_json::Value = serde_json::from_str(&packed.message).ok()?;
        serde_json::from_value(envelope.get("plaintext")?.clone()).ok()
    }

    pub fn issued(&self) -> Vec<(CredentialPayload, ProofFormat)> {
        self.state().issued.clone()
    }

    pub fn packed(&self) -> Vec<PackArgs> {
        self.state().packed.clone()
    }

    pub fn sent(&self) -> Vec<SendArgs> {
        self.state().sent.clone()
    }

    fn state(&self) -> MutexGuard<'_, FakeAgentState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fails(&self, call: FakeFailure) -> bool {
        self.failure == Some(call)
    }
}

#[async_trait]
impl HostAgent for FakeAgent {
    async fn create_verifiable_credential(
        &self,
        credential: CredentialPayload,
        proof_format: ProofFormat,
    ) -> Result<VerifiableCredential, AgentError> {
        if self.fails(FakeFailure::Issue) {
            return Err(AgentError::Issuance("fake issuer refused".to_string()));
        }

        let mut signed = serde_json::to_value(&credential)
            .map_err(|e| AgentError::Issuance(e.to_string()))?;
        signed["proof"] = json!({ "type": "FakeProof", "format": proof_format });

        self.state().issued.push((credential, proof_format));
        Ok(VerifiableCredential(signed))
    }

    async fn pack_didcomm_message(&self, args: PackArgs) -> Result<PackedMessage, AgentError> {
        if self.fails(FakeFailure::Pack) {
            return Err(AgentError::Packing("fake packer refused".to_string()));
        }

        let envelope = json!({
            "packing": args.packing.as_str(),
            "plaintext": args.message,
        });
        self.state().packed.push(args);

        Ok(PackedMessage {
            message: envelope.to_string(),
        })
    }

    async fn send_didcomm_message(&self, args: SendArgs) -> Result<SendResult, AgentError> {
        if self.fails(FakeFailure::Send) {
            return Err(AgentError::Dispatch(format!(
                "no service endpoint for {}",
                args.recipient_did_url
            )));
        }

        let transport_id = format!("fake-transport-{}", args.message_id);
        self.state().sent.push(args);
        Ok(SendResult { transport_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::DidCommMessage;
    use chrono::Utc;

    fn sample_message() -> DidCommMessage {
        DidCommMessage {
            message_type: "t".to_string(),
            from: "did:peer:B".to_string(),
            to: "did:peer:A".to_string(),
            id: "q1-response".to_string(),
            thid: Some("thid1".to_string()),
            pthid: None,
            body: json!({}),
            attachments: None,
            return_route: None,
        }
    }

    #[tokio::test]
    async fn test_fake_pack_roundtrips_plaintext() {
        let agent = FakeAgent::new();
        let packed = agent
            .pack_didcomm_message(PackArgs {
                message: sample_message(),
                packing: PackingMode::Authcrypt,
            })
            .await
            .unwrap();

        let plaintext = FakeAgent::unpack(&packed).unwrap();
        assert_eq!(plaintext.thid.as_deref(), Some("thid1"));
        assert_eq!(agent.packed().len(), 1);
    }

    #[tokio::test]
    async fn test_fake_issue_adds_proof() {
        let agent = FakeAgent::new();
        let payload = CredentialPayload::new("did:peer:B", "X", json!({"id": "did:peer:A"}), Utc::now());
        let vc = agent
            .create_verifiable_credential(payload, ProofFormat::Jwt)
            .await
            .unwrap();

        assert_eq!(vc.as_value()["proof"]["format"], "jwt");
        assert_eq!(agent.issued().len(), 1);
    }

    #[tokio::test]
    async fn test_fake_failure_records_nothing() {
        let agent = FakeAgent::failing(FakeFailure::Send);
        let result = agent
            .send_didcomm_message(SendArgs {
                message_id: "m".to_string(),
                packed_message: PackedMessage {
                    message: "{}".to_string(),
                },
                recipient_did_url: "did:peer:A".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AgentError::Dispatch(_))));
        assert!(agent.sent().is_empty());
    }
}
