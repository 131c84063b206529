//! Question Message Handler
//!
//! Recognises the question type of one `QuestionProtocol`, validates it,
//! retrieves an answer, has the host sign it as a credential and sends the
//! credential back to the asker.
//!
//! Delivery follows the question's `return_route`: with `all` the packed
//! response is embedded as `ReturnRouteResponse` metadata for the
//! transport to flush over the held connection; otherwise it is dispatched
//! as a new message to the question's `from`.
//!
//! Failures never leave the handler. They are logged, the message is
//! returned without any response metadata, and (if enabled) a problem
//! report goes back to the sender.

use crate::inference::HuggingFaceClient;
use crate::pipeline::{Delivery, HandlerOutcome, MessageHandler};
use crate::problem_report::build_problem_report;
use crate::protocol::QuestionProtocol;
use crate::retriever::{AnswerRetriever, Completion, RetrieverSettings};
use async_trait::async_trait;
use chrono::Utc;
use starchat_common::{
    AccessToken, DidCommMessage, HandlerError, HandlerSettings, HostAgent, InvalidMessageError,
    Message, MetaData, PackArgs, PluginConfig, RetrievalError, ReturnRoute, ReturnRouteResponse,
    SendArgs, DEFAULT_MODEL, DIDCOMM_ENCRYPTED_MEDIA_TYPE, RETURN_ROUTE_RESPONSE_META,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fields of a question that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuestion {
    pub id: String,
    pub from: String,
    pub to: String,
    /// Question's thread id, or its id when it has none
    pub thid: String,
    pub query: String,
}

/// Empty strings count as absent
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Check the fields every answerable question needs
pub fn validate_question(
    message: &Message,
    protocol: QuestionProtocol,
) -> Result<ValidatedQuestion, InvalidMessageError> {
    let missing = |field| InvalidMessageError::new(protocol.label(), field);

    let from = present(&message.from).ok_or_else(|| missing("from"))?;
    let to = present(&message.to).ok_or_else(|| missing("to"))?;
    let query = message
        .body_str(protocol.query_field())
        .ok_or_else(|| missing(protocol.query_field_path()))?;

    let thid = present(&message.thread_id).unwrap_or(&message.id);

    Ok(ValidatedQuestion {
        id: message.id.clone(),
        from: from.to_string(),
        to: to.to_string(),
        thid: thid.to_string(),
        query: query.to_string(),
    })
}

pub struct QuestionHandler {
    protocol: QuestionProtocol,
    retriever: AnswerRetriever,
    token: AccessToken,
    model: String,
    settings: HandlerSettings,
}

impl QuestionHandler {
    pub fn new(protocol: QuestionProtocol, retriever: AnswerRetriever, token: AccessToken) -> Self {
        Self {
            protocol,
            retriever,
            token,
            model: DEFAULT_MODEL.to_string(),
            settings: HandlerSettings::default(),
        }
    }

    /// Handler backed by the configured inference endpoint
    pub fn from_config(
        protocol: QuestionProtocol,
        config: &PluginConfig,
        token: AccessToken,
    ) -> Result<Self, RetrievalError> {
        let client = HuggingFaceClient::new(&config.inference)?;
        let retriever = AnswerRetriever::with_settings(
            Arc::new(client),
            RetrieverSettings::from(&config.inference),
        );
        Ok(Self::new(protocol, retriever, token)
            .with_model(&config.inference.model)
            .with_settings(config.handler.clone()))
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_settings(mut self, settings: HandlerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn protocol(&self) -> QuestionProtocol {
        self.protocol
    }

    async fn answer(
        &self,
        message: &mut Message,
        agent: &dyn HostAgent,
    ) -> Result<Delivery, HandlerError> {
        let question = validate_question(message, self.protocol)?;

        let retrieved = self.retriever.retrieve(&question.query, &self.token).await?;
        if retrieved.completion == Completion::Truncated {
            warn!(
                "Answer to {} is truncated after {} generation calls",
                question.id, retrieved.remote_calls
            );
        }

        let payload = self.protocol.credential_payload(
            &question.from,
            &question.to,
            &question.query,
            &retrieved.text,
            &self.model,
            Utc::now(),
        );
        let credential = agent
            .create_verifiable_credential(payload, self.settings.proof_format)
            .await?;

        let response = self.protocol.response_message(
            &question.to,
            &question.from,
            &question.id,
            &question.thid,
            credential,
        );
        let delivery = self.deliver(message, agent, response).await?;

        let sent = match &delivery {
            Delivery::Dispatched { result, .. } => Some(serde_json::to_string(result)?),
            Delivery::ReturnRoute { .. } => None,
        };
        message.add_meta_data(MetaData::new(self.protocol.sent_meta_type(), sent));

        Ok(delivery)
    }

    /// Pack `outbound` and either embed it for the return route or send it
    async fn deliver(
        &self,
        message: &mut Message,
        agent: &dyn HostAgent,
        outbound: DidCommMessage,
    ) -> Result<Delivery, HandlerError> {
        let response_id = outbound.id.clone();
        let recipient = outbound.to.clone();
        let packed = agent
            .pack_didcomm_message(PackArgs {
                message: outbound,
                packing: self.settings.packing,
            })
            .await?;

        match message.return_route() {
            ReturnRoute::All => {
                debug!("Reusing inbound connection for {}", response_id);
                let pending = ReturnRouteResponse {
                    id: response_id.clone(),
                    message: packed.message,
                    content_type: DIDCOMM_ENCRYPTED_MEDIA_TYPE.to_string(),
                };
                message.add_meta_data(MetaData::new(
                    RETURN_ROUTE_RESPONSE_META,
                    Some(serde_json::to_string(&pending)?),
                ));
                Ok(Delivery::ReturnRoute { response_id })
            }
            ReturnRoute::None => {
                debug!("Dispatching {} to {}", response_id, recipient);
                let result = agent
                    .send_didcomm_message(SendArgs {
                        message_id: response_id.clone(),
                        packed_message: packed,
                        recipient_did_url: recipient,
                    })
                    .await?;
                Ok(Delivery::Dispatched {
                    response_id,
                    result,
                })
            }
        }
    }

    async fn report_problem(&self, message: &mut Message, agent: &dyn HostAgent, error: &HandlerError) {
        let (Some(from), Some(to)) = (present(&message.from), present(&message.to)) else {
            debug!("Cannot report problem without both `from` and `to`");
            return;
        };
        let from = from.to_string();
        let thid = present(&message.thread_id).unwrap_or(&message.id);
        let report = build_problem_report(to, &from, thid, error);

        match self.deliver(message, agent, report).await {
            Ok(delivery) => info!("Problem report {} sent to {}", delivery.response_id(), from),
            Err(e) => warn!("Failed to send problem report to {}: {}", from, e),
        }
    }
}

#[async_trait]
impl MessageHandler for QuestionHandler {
    fn name(&self) -> &str {
        self.protocol.label()
    }

    #[tracing::instrument(skip_all, fields(id = %message.id, thid = ?message.thread_id))]
    async fn try_handle(
        &self,
        message: &mut Message,
        agent: &dyn HostAgent,
    ) -> Option<HandlerOutcome> {
        if message.message_type == self.protocol.question_type() {
            info!("{} question received", self.protocol.label());

            return Some(match self.answer(message, agent).await {
                Ok(delivery) => {
                    info!("Answered {} via {:?}", message.id, delivery);
                    HandlerOutcome::Responded(delivery)
                }
                Err(e) => {
                    warn!("Could not answer {}: {}", message.id, e);
                    if self.settings.problem_reports {
                        self.report_problem(message, agent, &e).await;
                    }
                    HandlerOutcome::Failed(e)
                }
            });
        }

        if message.message_type == self.protocol.response_type() {
            if let Some(receipt) = self.protocol.receipt_meta_type() {
                info!("{} response received", self.protocol.label());
                message.add_meta_data(MetaData::new(receipt, Some("true".to_string())));
                return Some(HandlerOutcome::Acknowledged);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn question(data: serde_json::Value) -> Message {
        Message {
            id: "q1".to_string(),
            message_type: QuestionProtocol::Starchat.question_type().to_string(),
            from: Some("did:peer:A".to_string()),
            to: Some("did:peer:B".to_string()),
            thread_id: Some("thid1".to_string()),
            data,
            ..Message::default()
        }
    }

    #[test]
    fn test_validate_accepts_complete_question() {
        let msg = question(json!({"queryInput": "What is rice?"}));
        let q = validate_question(&msg, QuestionProtocol::Starchat).unwrap();
        assert_eq!(q.from, "did:peer:A");
        assert_eq!(q.to, "did:peer:B");
        assert_eq!(q.thid, "thid1");
        assert_eq!(q.query, "What is rice?");
    }

    #[test]
    fn test_validate_reports_missing_field() {
        let mut msg = question(json!({"queryInput": "What is rice?"}));
        msg.from = None;
        let err = validate_question(&msg, QuestionProtocol::Starchat).unwrap_err();
        assert_eq!(err.field, "from");

        let mut msg = question(json!({"queryInput": "What is rice?"}));
        msg.to = Some(String::new());
        let err = validate_question(&msg, QuestionProtocol::Starchat).unwrap_err();
        assert_eq!(err.field, "to");

        let msg = question(json!({"prompt": "What is rice?"}));
        let err = validate_question(&msg, QuestionProtocol::Starchat).unwrap_err();
        assert_eq!(err.field, "body.queryInput");

        let msg = question(json!({"queryInput": "What is rice?"}));
        let err = validate_question(&msg, QuestionProtocol::TextGeneration).unwrap_err();
        assert_eq!(err.field, "body.prompt");
        assert_eq!(err.protocol, "ML Text Generation");
    }

    #[test]
    fn test_validate_falls_back_to_message_id_for_thread() {
        let mut msg = question(json!({"queryInput": "What is rice?"}));
        msg.thread_id = None;
        let q = validate_question(&msg, QuestionProtocol::Starchat).unwrap();
        assert_eq!(q.thid, "q1");
    }
}
