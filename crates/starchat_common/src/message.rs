//! DIDComm message model
//!
//! `Message` is the host's decoded view of an inbound message: what the
//! pipeline hands to each handler, and what handlers annotate with
//! metadata. `DidCommMessage` is the plaintext outbound form that gets
//! packed and dispatched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Media type of an authcrypt/anoncrypt packed DIDComm message
pub const DIDCOMM_ENCRYPTED_MEDIA_TYPE: &str = "application/didcomm-encrypted+json";

/// Metadata type under which a return-route response is embedded
pub const RETURN_ROUTE_RESPONSE_META: &str = "ReturnRouteResponse";

/// Whether the sender is holding its connection open for the reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReturnRoute {
    All,
    #[default]
    None,
}

impl ReturnRoute {
    /// Anything other than `all` (including absence) means no return route
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("all") => ReturnRoute::All,
            _ => ReturnRoute::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnRoute::All => "all",
            ReturnRoute::None => "none",
        }
    }
}

/// Packed reply waiting to be flushed over the held connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRouteResponse {
    pub id: String,
    pub message: String,
    pub content_type: String,
}

/// One metadata entry attached to an inbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaData {
    #[serde(rename = "type")]
    pub meta_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl MetaData {
    pub fn new(meta_type: impl Into<String>, value: Option<String>) -> Self {
        Self {
            meta_type: meta_type.into(),
            value,
        }
    }
}

/// Inbound message as decoded by the host framework
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Message body
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub return_route: Option<String>,
    #[serde(default)]
    pub meta_data: Vec<MetaData>,
}

impl Message {
    pub fn add_meta_data(&mut self, entry: MetaData) {
        self.meta_data.push(entry);
    }

    /// First metadata entry of the given type
    pub fn meta_data_of(&self, meta_type: &str) -> Option<&MetaData> {
        self.meta_data.iter().find(|m| m.meta_type == meta_type)
    }

    pub fn return_route(&self) -> ReturnRoute {
        ReturnRoute::parse(self.return_route.as_deref())
    }

    /// String field of the body, treating empty strings as absent
    pub fn body_str(&self, field: &str) -> Option<&str> {
        self.data
            .get(field)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}

impl From<DidCommMessage> for Message {
    fn from(msg: DidCommMessage) -> Self {
        Self {
            id: msg.id,
            message_type: msg.message_type,
            from: Some(msg.from),
            to: Some(msg.to),
            thread_id: msg.thid,
            data: msg.body,
            return_route: msg.return_route.map(|r| r.as_str().to_string()),
            meta_data: Vec::new(),
        }
    }
}

/// JSON payload of an attachment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentData {
    pub json: Value,
}

/// DIDComm v2 attachment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub data: AttachmentData,
}

impl Attachment {
    pub fn json(id: impl Into<String>, json: Value) -> Self {
        Self {
            id: Some(id.into()),
            media_type: Some("application/json".to_string()),
            data: AttachmentData { json },
        }
    }
}

/// Plaintext DIDComm message, ready to be packed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DidCommMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub from: String,
    pub to: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pthid: Option<String>,
    #[serde(default)]
    pub body: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_route: Option<ReturnRoute>,
}
