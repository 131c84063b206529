//! Question/answer protocol variants
//!
//! Two DIDComm protocols share the same flow and differ only in message
//! types, the body field carrying the question, the credential they issue
//! and how the credential travels in the response.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use starchat_common::{
    Attachment, CredentialPayload, DidCommMessage, ReturnRoute, VerifiableCredential,
};
use uuid::Uuid;

pub const STARCHAT_QUESTION_MESSAGE_TYPE: &str = "https://veramo.io/didcomm/starchat/1.0/question";
pub const STARCHAT_RESPONSE_MESSAGE_TYPE: &str = "https://veramo.io/didcomm/starchat/1.0/response";
pub const ML_TEXT_GENERATION_PROMPT_MESSAGE_TYPE: &str =
    "https://veramo.io/didcomm/ml-text-generation/1.0/prompt";
pub const ML_TEXT_GENERATION_RESPONSE_MESSAGE_TYPE: &str =
    "https://veramo.io/didcomm/ml-text-generation/1.0/response";

const MODEL_LICENSE: &str = "bigcode-openrail-m";
const LINKED_PAPERS: [&str; 2] = ["arxiv:1911.02150", "arxiv:2205.14135"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionProtocol {
    /// `body.queryInput` in, `StarchatAnswer` credential attached to the response
    Starchat,
    /// `body.prompt` in, `TextGenerationResponse` credential as the response body
    TextGeneration,
}

impl QuestionProtocol {
    pub fn label(&self) -> &'static str {
        match self {
            QuestionProtocol::Starchat => "Starchat",
            QuestionProtocol::TextGeneration => "ML Text Generation",
        }
    }

    pub fn question_type(&self) -> &'static str {
        match self {
            QuestionProtocol::Starchat => STARCHAT_QUESTION_MESSAGE_TYPE,
            QuestionProtocol::TextGeneration => ML_TEXT_GENERATION_PROMPT_MESSAGE_TYPE,
        }
    }

    pub fn response_type(&self) -> &'static str {
        match self {
            QuestionProtocol::Starchat => STARCHAT_RESPONSE_MESSAGE_TYPE,
            QuestionProtocol::TextGeneration => ML_TEXT_GENERATION_RESPONSE_MESSAGE_TYPE,
        }
    }

    /// Body field holding the question text
    pub fn query_field(&self) -> &'static str {
        match self {
            QuestionProtocol::Starchat => "queryInput",
            QuestionProtocol::TextGeneration => "prompt",
        }
    }

    /// `query_field` as reported in validation errors
    pub fn query_field_path(&self) -> &'static str {
        match self {
            QuestionProtocol::Starchat => "body.queryInput",
            QuestionProtocol::TextGeneration => "body.prompt",
        }
    }

    pub fn credential_type(&self) -> &'static str {
        match self {
            QuestionProtocol::Starchat => "StarchatAnswer",
            QuestionProtocol::TextGeneration => "TextGenerationResponse",
        }
    }

    /// Metadata type recording the delivery outcome
    pub fn sent_meta_type(&self) -> &'static str {
        match self {
            QuestionProtocol::Starchat => "StarchatResponseSent",
            QuestionProtocol::TextGeneration => "ML Text Generation Response Sent",
        }
    }

    /// Metadata type marking a received response, for variants that
    /// recognise their own responses
    pub fn receipt_meta_type(&self) -> Option<&'static str> {
        match self {
            QuestionProtocol::Starchat => Some("StarchatResponse"),
            QuestionProtocol::TextGeneration => None,
        }
    }

    /// Unsigned credential carrying the answer, issued by `to` about `from`
    pub fn credential_payload(
        &self,
        from: &str,
        to: &str,
        question: &str,
        answer: &str,
        model: &str,
        issued_at: DateTime<Utc>,
    ) -> CredentialPayload {
        let subject = match self {
            QuestionProtocol::Starchat => json!({
                "id": from,
                "answer": answer,
                "model": model,
            }),
            QuestionProtocol::TextGeneration => json!({
                "id": from,
                "prompt": question,
                "response": answer,
                "model": model,
                "license": MODEL_LICENSE,
                "linkedPapers": LINKED_PAPERS,
            }),
        };
        CredentialPayload::new(to, self.credential_type(), subject, issued_at)
    }

    /// Question message; a fresh thread is started when `thid` is `None`
    pub fn question_message(
        &self,
        query: &str,
        sender_did_url: &str,
        recipient_did_url: &str,
        thid: Option<&str>,
        return_route: ReturnRoute,
    ) -> DidCommMessage {
        let body = match self {
            QuestionProtocol::Starchat => json!({
                "responseRequested": true,
                "queryInput": query,
            }),
            QuestionProtocol::TextGeneration => json!({ "prompt": query }),
        };

        DidCommMessage {
            message_type: self.question_type().to_string(),
            from: sender_did_url.to_string(),
            to: recipient_did_url.to_string(),
            id: Uuid::new_v4().to_string(),
            thid: Some(
                thid.map(str::to_string)
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
            ),
            pthid: None,
            body,
            attachments: None,
            return_route: Some(return_route),
        }
    }

    /// Response correlated to question `question_id` on thread `thid`
    pub fn response_message(
        &self,
        sender_did_url: &str,
        recipient_did_url: &str,
        question_id: &str,
        thid: &str,
        credential: VerifiableCredential,
    ) -> DidCommMessage {
        let (body, attachments) = match self {
            QuestionProtocol::Starchat => (
                Value::Object(Default::default()),
                Some(vec![Attachment::json("credential", credential.into_value())]),
            ),
            QuestionProtocol::TextGeneration => (credential.into_value(), None),
        };

        DidCommMessage {
            message_type: self.response_type().to_string(),
            from: sender_did_url.to_string(),
            to: recipient_did_url.to_string(),
            id: response_id(question_id),
            thid: Some(thid.to_string()),
            pthid: None,
            body,
            attachments,
            return_route: None,
        }
    }
}

pub fn response_id(question_id: &str) -> String {
    format!("{}-response", question_id)
}

/// Question message for `protocol`
pub fn create_question_message(
    protocol: QuestionProtocol,
    query: &str,
    sender_did_url: &str,
    recipient_did_url: &str,
    thid: Option<&str>,
    return_route: bool,
) -> DidCommMessage {
    let route = if return_route {
        ReturnRoute::All
    } else {
        ReturnRoute::None
    };
    protocol.question_message(query, sender_did_url, recipient_did_url, thid, route)
}

/// Response message for `protocol`
pub fn create_response_message(
    protocol: QuestionProtocol,
    sender_did_url: &str,
    recipient_did_url: &str,
    question_id: &str,
    thid: &str,
    credential: VerifiableCredential,
) -> DidCommMessage {
    protocol.response_message(sender_did_url, recipient_did_url, question_id, thid, credential)
}
