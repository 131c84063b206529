//! Message handler pipeline
//!
//! An ordered list of handlers. Each inbound message is offered to the
//! handlers in turn; the first one that recognises it consumes it and the
//! rest are skipped. Unrecognised messages come back untouched.

use async_trait::async_trait;
use starchat_common::{HandlerError, HostAgent, Message, SendResult};
use tracing::debug;

/// How a consumed message was delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Packed response embedded as metadata for the held connection
    ReturnRoute { response_id: String },
    /// Packed response sent as a new outbound message
    Dispatched {
        response_id: String,
        result: SendResult,
    },
}

impl Delivery {
    pub fn response_id(&self) -> &str {
        match self {
            Delivery::ReturnRoute { response_id } => response_id,
            Delivery::Dispatched { response_id, .. } => response_id,
        }
    }
}

/// Result of a handler consuming a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// A response was produced and delivered
    Responded(Delivery),
    /// The message was recognised and annotated, nothing else to do
    Acknowledged,
    /// The message was recognised but could not be answered; the error has
    /// already been logged
    Failed(HandlerError),
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn name(&self) -> &str;

    /// `None` when the message is not for this handler
    async fn try_handle(
        &self,
        message: &mut Message,
        agent: &dyn HostAgent,
    ) -> Option<HandlerOutcome>;
}

#[derive(Default)]
pub struct MessagePipeline {
    handlers: Vec<Box<dyn MessageHandler>>,
}

impl MessagePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, handler: impl MessageHandler + 'static) -> Self {
        self.push(handler);
        self
    }

    pub fn push(&mut self, handler: impl MessageHandler + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Offer `message` to each handler until one consumes it
    pub async fn dispatch(
        &self,
        message: &mut Message,
        agent: &dyn HostAgent,
    ) -> Option<HandlerOutcome> {
        for handler in &self.handlers {
            if let Some(outcome) = handler.try_handle(message, agent).await {
                debug!("{} consumed message {}", handler.name(), message.id);
                return Some(outcome);
            }
        }
        debug!("No handler for message type {}", message.message_type);
        None
    }

    /// Run the pipeline and hand the (possibly annotated) message back
    pub async fn handle(&self, mut message: Message, agent: &dyn HostAgent) -> Message {
        self.dispatch(&mut message, agent).await;
        message
    }
}
