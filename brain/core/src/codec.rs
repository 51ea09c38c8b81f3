//! Wire Codec
//!
//! JSON text encoding for everything that crosses the face <-> brain socket.
//! Every payload is a JSON object whose `type` field selects the variant.
//!
//! # Wire Format
//!
//! ```text
//! {"type": "<discriminant>", ...variant fields}
//! ```
//!
//! Decoding is strict about the discriminant: a payload that is not an
//! object, has no string `type`, or names a type the receiving side does not
//! know is rejected with a distinct [`CodecError`] instead of being coerced
//! into a default variant.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Maximum encoded payload size (1 MB)
///
/// Inbound payloads above this size are rejected before parsing.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Errors produced while encoding or decoding wire payloads
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload is not valid JSON
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Payload is valid JSON but not an object
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// Object has no string `type` field
    #[error("payload has no `type` discriminant")]
    MissingType,

    /// The `type` field names an unknown variant
    #[error("unknown event type `{0}`")]
    UnknownType(String),

    /// The variant is known but its fields do not match
    #[error("invalid `{event_type}` payload: {reason}")]
    InvalidFields {
        /// The discriminant that was recognised
        event_type: String,
        /// Why the fields were rejected
        reason: String,
    },

    /// Payload exceeds [`MAX_PAYLOAD_SIZE`]
    #[error("payload too large: {size} bytes (max: {max})")]
    TooLarge {
        /// Actual payload size in bytes
        size: usize,
        /// Allowed maximum
        max: usize,
    },

    /// Serialization failed
    #[error("failed to serialize event: {0}")]
    Serialize(String),
}

/// A tagged event that travels over the wire
///
/// Implementors are serde enums tagged with `#[serde(tag = "type")]`.
pub trait WireEvent: Serialize + DeserializeOwned {
    /// Every discriminant this event type accepts
    const TYPES: &'static [&'static str];

    /// The discriminant of this value
    fn event_type(&self) -> &'static str;
}

/// Encode an event to its JSON text representation
///
/// # Errors
///
/// Returns [`CodecError::Serialize`] if serialization fails.
pub fn encode<T: WireEvent>(event: &T) -> Result<String, CodecError> {
    serde_json::to_string(event).map_err(|e| CodecError::Serialize(e.to_string()))
}

/// Decode an event from JSON text
///
/// # Errors
///
/// Returns a [`CodecError`] describing which layer of validation failed.
pub fn decode<T: WireEvent>(raw: &str) -> Result<T, CodecError> {
    if raw.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::TooLarge {
            size: raw.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| CodecError::Malformed(e.to_string()))?;

    let event_type = match &value {
        serde_json::Value::Object(map) => match map.get("type") {
            Some(serde_json::Value::String(t)) => t.clone(),
            _ => return Err(CodecError::MissingType),
        },
        _ => return Err(CodecError::NotAnObject),
    };

    if !T::TYPES.contains(&event_type.as_str()) {
        return Err(CodecError::UnknownType(event_type));
    }

    serde_json::from_value(value).map_err(|e| CodecError::InvalidFields {
        event_type,
        reason: e.to_string(),
    })
}

/// Shorten a raw payload for log output
#[must_use]
pub fn preview(raw: &str) -> String {
    const LIMIT: usize = 200;
    if raw.chars().count() > LIMIT {
        let cut: String = raw.chars().take(LIMIT).collect();
        format!("{cut}...")
    } else {
        raw.to_string()
    }
}
