//! Brain Messages
//!
//! Events sent from the brain to face displays. These are the only things a
//! face ever hears from the brain: phase changes, the reply text (streamed or
//! in one piece), a chosen eye expression and the end-of-speech signal.
//!
//! # Ordering Contract
//!
//! For any response id, `message_start` precedes every `message_chunk`
//! carrying that id, chunk indices count up from 0 without gaps, and exactly
//! one `message_end` follows the last chunk. Faces rely on this to reset and
//! append their speech bubble.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError, WireEvent};

/// Messages from brain to face
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Conversation phase (drives mouth mode on the face)
    State {
        /// The new phase
        value: StateValue,
    },

    /// Complete reply text in one piece (legacy, non-streaming)
    Message {
        /// Speech text
        text: String,
    },

    /// A new streamed response begins; the face clears its bubble
    MessageStart {
        /// Response identifier shared by the following chunks
        id: ResponseId,
    },

    /// One piece of a streamed response
    MessageChunk {
        /// Response identifier
        id: ResponseId,
        /// Zero-based position of this chunk in the response
        index: u32,
        /// Chunk text
        text: String,
    },

    /// The streamed response is complete
    MessageEnd {
        /// Response identifier
        id: ResponseId,
    },

    /// Eye expression to show, optionally for a limited time
    Emotion {
        /// Expression label (canonical when the contract knows it)
        value: String,
        /// How long to hold the expression before returning to neutral
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u32>,
    },

    /// Stop the mouth animation
    SpeakingEnd,

    /// Version of the face contract this brain speaks
    ContractInfo {
        /// Contract version string
        version: String,
    },
}

impl WireEvent for OutboundEvent {
    const TYPES: &'static [&'static str] = &[
        "state",
        "message",
        "message_start",
        "message_chunk",
        "message_end",
        "emotion",
        "speaking_end",
        "contract_info",
    ];

    fn event_type(&self) -> &'static str {
        match self {
            Self::State { .. } => "state",
            Self::Message { .. } => "message",
            Self::MessageStart { .. } => "message_start",
            Self::MessageChunk { .. } => "message_chunk",
            Self::MessageEnd { .. } => "message_end",
            Self::Emotion { .. } => "emotion",
            Self::SpeakingEnd => "speaking_end",
            Self::ContractInfo { .. } => "contract_info",
        }
    }
}

impl OutboundEvent {
    /// Build a `state` event
    #[must_use]
    pub fn state(value: StateValue) -> Self {
        Self::State { value }
    }

    /// Build a legacy full-text `message` event
    #[must_use]
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message { text: text.into() }
    }

    /// Build a `message_start` event
    #[must_use]
    pub fn message_start(id: ResponseId) -> Self {
        Self::MessageStart { id }
    }

    /// Build a `message_chunk` event
    #[must_use]
    pub fn message_chunk(id: ResponseId, index: u32, text: impl Into<String>) -> Self {
        Self::MessageChunk {
            id,
            index,
            text: text.into(),
        }
    }

    /// Build a `message_end` event
    #[must_use]
    pub fn message_end(id: ResponseId) -> Self {
        Self::MessageEnd { id }
    }

    /// Build an `emotion` event
    #[must_use]
    pub fn emotion(value: impl Into<String>, duration_ms: Option<u32>) -> Self {
        Self::Emotion {
            value: value.into(),
            duration_ms,
        }
    }

    /// Build a `speaking_end` event
    #[must_use]
    pub fn speaking_end() -> Self {
        Self::SpeakingEnd
    }

    /// Build a `contract_info` event
    #[must_use]
    pub fn contract_info(version: impl Into<String>) -> Self {
        Self::ContractInfo {
            version: version.into(),
        }
    }

    /// Serialize to JSON text for the wire
    pub fn to_json(&self) -> Result<String, CodecError> {
        codec::encode(self)
    }

    /// Parse from JSON text (used by faces and tests)
    pub fn from_json(raw: &str) -> Result<Self, CodecError> {
        codec::decode(raw)
    }
}

/// Conversation phase values understood by the face
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateValue {
    /// Nothing happening
    Idle,
    /// Waiting for the user to speak
    Listening,
    /// Working on a reply
    Thinking,
    /// Delivering a reply
    Speaking,
}

impl StateValue {
    /// Wire name of this phase
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
        }
    }
}

/// Identifier for one streamed response
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub String);

impl ResponseId {
    /// Generate a fresh response ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("resp_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ResponseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResponseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
