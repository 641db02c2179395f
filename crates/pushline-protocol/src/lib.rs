//! # pushline-protocol
//!
//! Wire envelopes for the Pushline real-time push layer.
//!
//! Clients and the server exchange JSON text frames shaped as
//! `{"action": ..., "data": {...}}`.
//!
//! ## Actions
//!
//! - `MESSAGE` - direct message, delivered in the `message` shape
//! - `LIKE` / `UPDATE_LIKE_ID` / `REMOVE_LIKE` / `COMMENT` / `FOLLOW` -
//!   social events, delivered in the `notification` shape
//!
//! ## Example
//!
//! ```rust
//! use pushline_protocol::{codec, ActionKind, OutboundEnvelope, UserId};
//!
//! let raw = r#"{"action":"MESSAGE","data":{"sendeeId":2,"text":"hi"}}"#;
//! let envelope = codec::decode(raw).unwrap();
//! assert_eq!(envelope.action, ActionKind::Message);
//!
//! let data = envelope.message_data().unwrap();
//! assert_eq!(data.sendee_id, Some(UserId::new("2")));
//!
//! let outbound = OutboundEnvelope::message(Some(UserId::new("1")), data);
//! let text = codec::encode(&outbound).unwrap();
//! assert!(text.starts_with(r#"{"action":"message""#));
//! ```

pub mod action;
pub mod codec;
pub mod envelope;
pub mod user;

pub use action::{ActionKind, OutboundKind};
pub use codec::{decode, encode, ProtocolError};
pub use envelope::{
    InboundEnvelope, MessageBody, MessageData, NotificationBody, NotificationData,
    OutboundEnvelope,
};
pub use user::UserId;
