//! Error types for the question handlers.
//!
//! Validation problems are detected before any remote call and carry the
//! name of the missing field. Retrieval problems come from the inference
//! endpoint. Agent problems come from the host framework (issuance,
//! packing, dispatch). All of them are caught at the handler boundary.

use std::time::Duration;
use thiserror::Error;

/// A required field of an inbound question is missing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid_argument: {protocol} message received without `{field}` set")]
pub struct InvalidMessageError {
    /// Human label of the protocol ("Starchat", "ML Text Generation")
    pub protocol: &'static str,
    /// Dotted path of the missing field, e.g. `body.queryInput`
    pub field: &'static str,
}

impl InvalidMessageError {
    pub fn new(protocol: &'static str, field: &'static str) -> Self {
        Self { protocol, field }
    }
}

/// Failures talking to the text-generation endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("HTTP {status} from inference endpoint: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Malformed inference response: {0}")]
    MalformedResponse(String),

    #[error("Inference endpoint returned no generations")]
    EmptyResponse,

    #[error("Answer retrieval exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

/// Failures reported by the host agent framework
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("Credential issuance failed: {0}")]
    Issuance(String),

    #[error("Message packing failed: {0}")]
    Packing(String),

    #[error("Message dispatch failed: {0}")]
    Dispatch(String),
}

/// Everything that can go wrong while answering a recognised question
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error(transparent)]
    InvalidMessage(#[from] InvalidMessageError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("Failed to encode message: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        HandlerError::Encoding(e.to_string())
    }
}

impl HandlerError {
    /// DIDComm problem-report code for this failure
    pub fn problem_code(&self) -> &'static str {
        match self {
            HandlerError::InvalidMessage(_) => "e.p.msg.invalid-field",
            HandlerError::Retrieval(_) | HandlerError::Agent(_) | HandlerError::Encoding(_) => {
                "e.p.me.res"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_message_names_field() {
        let err = InvalidMessageError::new("Starchat", "body.queryInput");
        assert_eq!(
            err.to_string(),
            "invalid_argument: Starchat message received without `body.queryInput` set"
        );
    }

    #[test]
    fn test_handler_error_wraps_sources() {
        let err: HandlerError = RetrievalError::Timeout(30).into();
        assert_eq!(err.to_string(), "Request timeout after 30 seconds");
        assert_eq!(err.problem_code(), "e.p.me.res");

        let err: HandlerError = InvalidMessageError::new("Starchat", "from").into();
        assert_eq!(err.problem_code(), "e.p.msg.invalid-field");
    }
}
