//! Wire envelopes exchanged with chat clients.
//!
//! Every inbound frame is a JSON object. `{"messageType":"setup","chat":"<id>"}`
//! joins a chat; any other object carrying a string `chat` field is a payload
//! that is relayed, unchanged, to everyone in that chat.

use serde_json::{Map, Value};
use tungstenite::protocol::Message as WsMessage;

use crate::utils::error::RelayError;

/// Field that selects the envelope kind.
pub const MESSAGE_TYPE_FIELD: &str = "messageType";
/// `messageType` value of a subscribe request.
pub const SUBSCRIBE_TYPE: &str = "setup";
/// Field naming the chat (topic) an envelope belongs to.
pub const TOPIC_FIELD: &str = "chat";

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Subscribe { topic: String },
    Payload(PayloadEnvelope),
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| RelayError::protocol(format!("invalid json: {e}")))?;
        let Value::Object(body) = value else {
            return Err(RelayError::protocol("envelope is not a json object"));
        };

        let topic = topic_of(&body)?.to_string();
        match body.get(MESSAGE_TYPE_FIELD).and_then(Value::as_str) {
            Some(SUBSCRIBE_TYPE) => Ok(Envelope::Subscribe { topic }),
            _ => Ok(Envelope::Payload(PayloadEnvelope {
                topic,
                body,
                raw: text.to_string(),
            })),
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            Envelope::Subscribe { topic } => topic,
            Envelope::Payload(payload) => payload.topic(),
        }
    }
}

/// A chat message waiting to be fanned out.
///
/// Keeps the exact text it was received as, so subscribers get it verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadEnvelope {
    topic: String,
    body: Map<String, Value>,
    raw: String,
}

impl PayloadEnvelope {
    /// Builds a payload from an already decoded body, e.g. one produced by the
    /// REST layer after persisting a message.
    pub fn from_body(body: Map<String, Value>) -> Result<Self, RelayError> {
        let topic = topic_of(&body)?.to_string();
        let raw = Value::Object(body.clone()).to_string();
        Ok(Self { topic, body, raw })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The frame written to every subscriber.
    pub fn to_frame(&self) -> WsMessage {
        WsMessage::text(self.raw.clone())
    }
}

fn topic_of(body: &Map<String, Value>) -> Result<&str, RelayError> {
    match body.get(TOPIC_FIELD) {
        Some(Value::String(topic)) if !topic.is_empty() => Ok(topic),
        Some(Value::String(_)) => Err(RelayError::protocol("empty chat id")),
        Some(_) => Err(RelayError::protocol("chat id is not a string")),
        None => Err(RelayError::protocol("missing chat id")),
    }
}
