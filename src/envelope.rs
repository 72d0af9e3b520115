//! The `{action, payload}` envelope carried inside every stdio frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

pub const ACTION_INIT: &str = "init";
pub const ACTION_RELAY_MESSAGE: &str = "relayMessage";
pub const ACTION_TRPC: &str = "trpc";

/// Known envelope actions. Anything else is carried as [`Action::Other`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Init,
    RelayMessage,
    Trpc,
    Other,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub action: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, thiserror::Error)]
#[error("malformed envelope: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Session parameters carried by the `init` envelope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitParams {
    pub tags: BTreeSet<String>,
}

impl Envelope {
    pub fn new(action: impl Into<String>, payload: Value) -> Self {
        Self {
            action: action.into(),
            payload,
        }
    }

    pub fn init(params: &InitParams) -> Self {
        // A set of strings always serializes.
        let payload = serde_json::to_value(params).unwrap_or(Value::Null);
        Self::new(ACTION_INIT, payload)
    }

    /// Status text for the extension (`open`, `close`, the startup banner).
    pub fn relay_message(text: impl Into<String>) -> Self {
        Self::new(ACTION_RELAY_MESSAGE, Value::String(text.into()))
    }

    /// Wrap an opaque socket message. The text is not parsed.
    pub fn trpc(body: impl Into<String>) -> Self {
        Self::new(ACTION_TRPC, Value::String(body.into()))
    }

    pub fn kind(&self) -> Action {
        match self.action.as_str() {
            ACTION_INIT => Action::Init,
            ACTION_RELAY_MESSAGE => Action::RelayMessage,
            ACTION_TRPC => Action::Trpc,
            _ => Action::Other,
        }
    }

    /// The message body to put on the socket for a `trpc` envelope.
    ///
    /// A string payload goes out verbatim; anything else as compact JSON.
    pub fn trpc_body(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn init_params(&self) -> Result<InitParams, DecodeError> {
        Ok(InitParams::deserialize(&self.payload)?)
    }
}

pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub fn encode(envelope: &Envelope) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(envelope)
}
