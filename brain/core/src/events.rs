//! Face Events
//!
//! Events sent from face displays to the brain. Faces are renderers: the only
//! thing they report is text the user typed or said.

use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError, WireEvent};

/// Events from face to brain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// The user submitted an utterance
    Input {
        /// What the user said
        text: String,
    },
}

impl WireEvent for InboundEvent {
    const TYPES: &'static [&'static str] = &["input"];

    fn event_type(&self) -> &'static str {
        match self {
            Self::Input { .. } => "input",
        }
    }
}

impl InboundEvent {
    /// Parse an inbound payload
    pub fn from_json(raw: &str) -> Result<Self, CodecError> {
        codec::decode(raw)
    }

    /// Serialize to JSON text (used by test clients)
    pub fn to_json(&self) -> Result<String, CodecError> {
        codec::encode(self)
    }
}
