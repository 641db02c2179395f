//! Inbound and outbound envelope types.
//!
//! Fields other than the routing target are opaque to the push layer: they
//! are carried through as raw JSON values and omitted from the outbound
//! object when the client did not send them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::ActionKind;
use crate::codec::ProtocolError;
use crate::user::UserId;

/// Fixed `message` field of every outbound notification.
pub const NOTIFICATION_MESSAGE: &str = "broadcast notification";

/// A decoded inbound envelope.
///
/// `data` stays untyped until the action is known; use
/// [`message_data`](Self::message_data) or
/// [`notification_data`](Self::notification_data) to decode it.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEnvelope {
    /// The action tag.
    pub action: ActionKind,
    /// Raw action payload.
    pub data: Value,
}

impl InboundEnvelope {
    /// Create a new inbound envelope.
    #[must_use]
    pub fn new(action: ActionKind, data: Value) -> Self {
        Self { action, data }
    }

    /// Decode the payload of a `MESSAGE` action.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] if `data` is not an object of the
    /// message shape.
    pub fn message_data(&self) -> Result<MessageData, ProtocolError> {
        MessageData::deserialize(&self.data).map_err(ProtocolError::Malformed)
    }

    /// Decode the payload of a notification action.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] if `data` is not an object of the
    /// notification shape.
    pub fn notification_data(&self) -> Result<NotificationData, ProtocolError> {
        NotificationData::deserialize(&self.data).map_err(ProtocolError::Malformed)
    }
}

/// Payload of a `MESSAGE` action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    /// Recipient of the message.
    #[serde(default)]
    pub sendee_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<Value>,
    /// Client-side id used to reconcile optimistic sends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<Value>,
}

/// Payload of a notification action (`LIKE`, `COMMENT`, `FOLLOW`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// Recipient of the notification.
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
}

/// Body of an outbound `message` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    /// Identity of the sender, `null` if the sender never identified.
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<Value>,
}

/// Body of an outbound `notification` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationBody {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    /// Identity of the sender, `null` if the sender never identified.
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
    pub message: String,
}

/// An envelope delivered to recipients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "lowercase")]
pub enum OutboundEnvelope {
    Message(MessageBody),
    Notification(NotificationBody),
}

impl OutboundEnvelope {
    /// Build a `message` envelope from a `MESSAGE` payload.
    #[must_use]
    pub fn message(sender: Option<UserId>, data: MessageData) -> Self {
        OutboundEnvelope::Message(MessageBody {
            kind: ActionKind::Message,
            user_id: sender,
            user_name: data.user_name,
            temp_id: data.temp_id,
            reference_id: data.reference_id,
            created_at: data.created_at,
            conversation_id: data.conversation_id,
            text: data.text,
        })
    }

    /// Build a `notification` envelope from a notification payload.
    #[must_use]
    pub fn notification(kind: ActionKind, sender: Option<UserId>, data: NotificationData) -> Self {
        OutboundEnvelope::Notification(NotificationBody {
            kind,
            user_id: sender,
            user_name: data.user_name,
            conversation_id: data.conversation_id,
            text: data.text,
            created_at: data.created_at,
            message: NOTIFICATION_MESSAGE.to_string(),
        })
    }

    /// The action that produced this envelope.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            OutboundEnvelope::Message(body) => body.kind,
            OutboundEnvelope::Notification(body) => body.kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_data_decode() {
        let envelope = InboundEnvelope::new(
            ActionKind::Message,
            json!({
                "sendeeId": 2,
                "userName": "alice",
                "tempId": "tmp-1",
                "text": "hello",
                "unrelated": true
            }),
        );

        let data = envelope.message_data().unwrap();
        assert_eq!(data.sendee_id, Some(UserId::new("2")));
        assert_eq!(data.user_name, Some(json!("alice")));
        assert_eq!(data.text, Some(json!("hello")));
        assert_eq!(data.conversation_id, None);
    }

    #[test]
    fn test_missing_target_is_none() {
        let envelope = InboundEnvelope::new(ActionKind::Follow, json!({"userName": "bob"}));
        let data = envelope.notification_data().unwrap();
        assert_eq!(data.user_id, None);
    }

    #[test]
    fn test_non_object_data_is_malformed() {
        let envelope = InboundEnvelope::new(ActionKind::Comment, json!("oops"));
        assert!(matches!(
            envelope.notification_data(),
            Err(ProtocolError::Malformed(_))
        ));

        let envelope = InboundEnvelope::new(ActionKind::Message, Value::Null);
        assert!(envelope.message_data().is_err());
    }

    #[test]
    fn test_outbound_message_shape() {
        let data = MessageData {
            sendee_id: Some("2".into()),
            user_name: Some(json!("alice")),
            temp_id: Some(json!("tmp-1")),
            reference_id: Some(json!(10)),
            created_at: Some(json!("2024-01-01T00:00:00Z")),
            conversation_id: Some(json!(5)),
            text: Some(json!("hello")),
        };

        let value = serde_json::to_value(OutboundEnvelope::message(Some("1".into()), data)).unwrap();
        assert_eq!(
            value,
            json!({
                "action": "message",
                "data": {
                    "type": "MESSAGE",
                    "userId": "1",
                    "userName": "alice",
                    "tempId": "tmp-1",
                    "referenceId": 10,
                    "createdAt": "2024-01-01T00:00:00Z",
                    "conversationId": 5,
                    "text": "hello"
                }
            })
        );
    }

    #[test]
    fn test_outbound_notification_shape() {
        let data = NotificationData {
            user_id: Some("9".into()),
            user_name: Some(json!("bob")),
            ..Default::default()
        };

        let value =
            serde_json::to_value(OutboundEnvelope::notification(ActionKind::Follow, None, data))
                .unwrap();
        assert_eq!(
            value,
            json!({
                "action": "notification",
                "data": {
                    "type": "FOLLOW",
                    "userId": null,
                    "userName": "bob",
                    "message": "broadcast notification"
                }
            })
        );
    }
}
