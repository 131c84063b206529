//! Starchat Handler - DIDComm question answering backed by a text-generation model
//!
//! A question arrives through the host's message pipeline, the answer is
//! polled from a remote inference endpoint, wrapped in a verifiable
//! credential and sent back to the asker.

pub mod handler;
pub mod inference;
pub mod logging;
pub mod pipeline;
pub mod problem_report;
pub mod protocol;
pub mod retriever;

pub use handler::{validate_question, QuestionHandler, ValidatedQuestion};
pub use inference::{FakeTextGenerator, HuggingFaceClient, TextGenerator};
pub use logging::init_logging;
pub use pipeline::{Delivery, HandlerOutcome, MessageHandler, MessagePipeline};
pub use problem_report::{build_problem_report, PROBLEM_REPORT_MESSAGE_TYPE};
pub use protocol::*;
pub use retriever::{AnswerRetriever, Completion, RetrievedAnswer, RetrieverSettings};

use starchat_common::{AccessToken, PluginConfig, RetrievalError};

/// Pipeline with a handler for each protocol variant, all using the
/// configured inference endpoint
pub fn standard_pipeline(
    config: &PluginConfig,
    token: AccessToken,
) -> Result<MessagePipeline, RetrievalError> {
    Ok(MessagePipeline::new()
        .with_handler(QuestionHandler::from_config(
            QuestionProtocol::Starchat,
            config,
            token.clone(),
        )?)
        .with_handler(QuestionHandler::from_config(
            QuestionProtocol::TextGeneration,
            config,
            token,
        )?))
}
