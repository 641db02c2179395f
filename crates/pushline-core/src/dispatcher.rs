//! Broadcast dispatcher.
//!
//! Resolves a target identity to its live connections and hands each one an
//! independent copy of the outbound envelope. Delivery is best effort: no
//! queueing for absent users, no retries, and a failed write to one
//! connection never stops the others.

use crate::registry::Registry;
use pushline_protocol::{
    codec, ActionKind, MessageData, NotificationData, OutboundEnvelope, UserId,
};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Result of one delivery call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Connections the envelope was written to.
    pub attempted: usize,
    /// Writes that were accepted.
    pub delivered: usize,
}

impl Delivery {
    /// Writes that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.attempted - self.delivered
    }
}

/// Fan-out of outbound envelopes to a user's connections.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    /// Create a dispatcher over a registry.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Deliver a direct message to every connection of `target`.
    pub fn deliver_message(
        &self,
        target: &UserId,
        sender: Option<UserId>,
        data: MessageData,
    ) -> Delivery {
        self.deliver(target, &OutboundEnvelope::message(sender, data))
    }

    /// Deliver a notification to every connection of `target`.
    pub fn deliver_notification(
        &self,
        target: &UserId,
        kind: ActionKind,
        sender: Option<UserId>,
        data: NotificationData,
    ) -> Delivery {
        self.deliver(target, &OutboundEnvelope::notification(kind, sender, data))
    }

    /// Deliver a prepared envelope to every connection of `target`.
    pub fn deliver(&self, target: &UserId, envelope: &OutboundEnvelope) -> Delivery {
        let recipients = self.registry.find_live_connections_for(target);
        if recipients.is_empty() {
            debug!(user = %target, action = %envelope.kind(), "No live connections, dropping");
            return Delivery::default();
        }

        let text = match codec::encode(envelope) {
            Ok(text) => text,
            Err(e) => {
                warn!(user = %target, error = %e, "Failed to encode envelope");
                return Delivery::default();
            }
        };

        let mut delivery = Delivery {
            attempted: recipients.len(),
            delivered: 0,
        };

        for recipient in recipients {
            match recipient.outbox.send(text.clone()) {
                Ok(()) => {
                    delivery.delivered += 1;
                    trace!(user = %target, connection = %recipient.connection_id, "Delivered");
                }
                Err(_) => {
                    warn!(
                        user = %target,
                        connection = %recipient.connection_id,
                        "Write failed, connection is closing"
                    );
                }
            }
        }

        debug!(
            user = %target,
            action = %envelope.kind(),
            recipients = delivery.delivered,
            "Delivered to user"
        );
        delivery
    }

    /// The registry this dispatcher reads from.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}
