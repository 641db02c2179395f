//! Action kinds carried in the `action` field of inbound envelopes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::codec::ProtocolError;

/// Inbound action tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// Direct message to another user.
    Message,
    /// A post was liked.
    Like,
    /// The id of a previously sent like was replaced.
    UpdateLikeId,
    /// A like was withdrawn.
    RemoveLike,
    /// A post was commented on.
    Comment,
    /// A user was followed.
    Follow,
}

/// Outbound envelope shape an action is delivered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundKind {
    Message,
    Notification,
}

impl ActionKind {
    /// All known actions.
    pub const ALL: [ActionKind; 6] = [
        ActionKind::Message,
        ActionKind::Like,
        ActionKind::UpdateLikeId,
        ActionKind::RemoveLike,
        ActionKind::Comment,
        ActionKind::Follow,
    ];

    /// Wire name of the action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Message => "MESSAGE",
            ActionKind::Like => "LIKE",
            ActionKind::UpdateLikeId => "UPDATE_LIKE_ID",
            ActionKind::RemoveLike => "REMOVE_LIKE",
            ActionKind::Comment => "COMMENT",
            ActionKind::Follow => "FOLLOW",
        }
    }

    /// The outbound shape this action is delivered in.
    #[must_use]
    pub fn outbound_kind(&self) -> OutboundKind {
        match self {
            ActionKind::Message => OutboundKind::Message,
            ActionKind::Like
            | ActionKind::UpdateLikeId
            | ActionKind::RemoveLike
            | ActionKind::Comment
            | ActionKind::Follow => OutboundKind::Notification,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownAction(s.to_string()))
    }
}

impl OutboundKind {
    /// Value of the outbound `action` field.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboundKind::Message => "message",
            OutboundKind::Notification => "notification",
        }
    }
}
