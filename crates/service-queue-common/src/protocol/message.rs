use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::action::Action;
use crate::protocol::error::{BrokerError, Result};
use crate::transport::{Frame, Multipart};

/// Issuer name stamped on every broker-authored control payload.
pub const BROKER_ISSUER: &str = "service_queue";

/// JSON body of a control message.
///
/// Broker-authored payloads always carry the full shape:
///
/// ```text
/// {"action": "ping", "history": [], "issuer": "service_queue", "data": [], "sections": {}}
/// ```
///
/// Inbound payloads only need `action`; the remaining fields default to empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlPayload {
    pub action: String,
    #[serde(default)]
    pub history: Vec<Value>,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub sections: Map<String, Value>,
}

impl ControlPayload {
    /// Builds a broker-authored payload for `action`.
    pub fn new(action: Action) -> Self {
        Self {
            action: action.as_str().to_string(),
            history: Vec::new(),
            issuer: BROKER_ISSUER.to_string(),
            data: Vec::new(),
            sections: Map::new(),
        }
    }

    /// Overrides the issuer, for payloads authored by workers or tools.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Extracts the `action` field from a JSON control payload.
///
/// Returns an empty string when the bytes are not JSON, are not an object, or
/// have no string `action` field.
pub fn parse_action(data: &[u8]) -> String {
    serde_json::from_slice::<Value>(data)
        .ok()
        .and_then(|root| {
            root.get("action")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_default()
}

/// A decoded inbound control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    /// Transport identity of the sender, which is also its registry id.
    pub issuer: String,
    pub action: Action,
}

impl ControlMessage {
    /// Decodes `[issuer][delimiter][json]`.
    ///
    /// Frames beyond the third are ignored. An unparseable payload yields
    /// `Action::Unknown("")` rather than an error.
    pub fn from_frames(frames: &[Frame]) -> Result<Self> {
        if frames.len() < 3 {
            return Err(BrokerError::MalformedMessage {
                frames: frames.len(),
            });
        }

        Ok(Self {
            issuer: String::from_utf8_lossy(&frames[0]).into_owned(),
            action: Action::parse(&parse_action(&frames[2])),
        })
    }
}

/// Frames a task for delivery on the output endpoint: `[workerId][payload...]`.
pub fn task_envelope(worker_id: &str, payload: Multipart) -> Multipart {
    let mut frames = Vec::with_capacity(payload.len() + 1);
    frames.push(worker_id.as_bytes().to_vec());
    frames.extend(payload);
    frames
}

/// Frames a control payload addressed to `worker_id`: `[workerId][""][json]`.
pub fn control_envelope(worker_id: &str, payload: &ControlPayload) -> Result<Multipart> {
    Ok(vec![
        worker_id.as_bytes().to_vec(),
        Vec::new(),
        payload.to_bytes()?,
    ])
}
