//! Codec for decoding inbound and encoding outbound envelopes.
//!
//! Envelopes travel as JSON text frames. Decoding is split in two so that
//! an unknown action tag is distinguishable from a frame that is not an
//! envelope at all.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::action::ActionKind;
use crate::envelope::{InboundEnvelope, OutboundEnvelope};

/// Default maximum inbound frame size (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame is not valid JSON or not of the envelope shape.
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Frame is a well-formed envelope with an unrecognized action.
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Frame exceeds maximum size.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },
}

impl ProtocolError {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::Malformed(_) => "malformed",
            ProtocolError::UnknownAction(_) => "unknown_action",
            ProtocolError::FrameTooLarge { .. } => "too_large",
        }
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    action: String,
    #[serde(default)]
    data: Value,
}

/// Decode an inbound envelope from a text frame of at most
/// [`MAX_FRAME_SIZE`] bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] for oversized frames,
/// [`ProtocolError::Malformed`] if the text is not an `{action, data}`
/// object, and [`ProtocolError::UnknownAction`] if the action tag is not
/// recognized.
pub fn decode(text: &str) -> Result<InboundEnvelope, ProtocolError> {
    decode_with_limit(text, MAX_FRAME_SIZE)
}

/// Decode an inbound envelope from a text frame of at most `max_size` bytes.
///
/// # Errors
///
/// Same as [`decode`], with `max_size` as the size limit.
pub fn decode_with_limit(text: &str, max_size: usize) -> Result<InboundEnvelope, ProtocolError> {
    if text.len() > max_size {
        return Err(ProtocolError::FrameTooLarge {
            size: text.len(),
            max: max_size,
        });
    }

    let raw: RawEnvelope = serde_json::from_str(text)?;
    let action: ActionKind = raw.action.parse()?;

    Ok(InboundEnvelope::new(action, raw.data))
}

/// Encode an outbound envelope to a text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(envelope: &OutboundEnvelope) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(envelope)?)
}
