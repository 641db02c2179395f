//! Action router for Pushline.
//!
//! The router decodes inbound text frames and dispatches them by action
//! kind. It never fails: malformed frames and unknown actions are logged and
//! discarded, leaving the connection and every other frame unaffected.

use crate::dispatcher::{Delivery, Dispatcher};
use pushline_protocol::{codec, ActionKind, InboundEnvelope, ProtocolError, UserId};
use pushline_transport::ConnectionId;
use tracing::{debug, warn};

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The envelope was handed to the dispatcher.
    Delivered {
        action: ActionKind,
        target: UserId,
        delivery: Delivery,
    },
    /// The envelope names no recipient.
    NoTarget(ActionKind),
    /// The frame is not a decodable envelope.
    Malformed,
    /// The action tag is not recognized.
    UnknownAction(String),
}

impl RouteOutcome {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            RouteOutcome::Delivered { .. } => "delivered",
            RouteOutcome::NoTarget(_) => "no_target",
            RouteOutcome::Malformed => "malformed",
            RouteOutcome::UnknownAction(_) => "unknown_action",
        }
    }
}

/// Routes inbound envelopes to the dispatcher.
#[derive(Clone)]
pub struct ActionRouter {
    dispatcher: Dispatcher,
    max_frame_size: usize,
}

impl ActionRouter {
    /// Create a router over a dispatcher, accepting frames up to
    /// [`codec::MAX_FRAME_SIZE`].
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            max_frame_size: codec::MAX_FRAME_SIZE,
        }
    }

    /// Set the largest accepted inbound frame, in bytes.
    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// The largest accepted inbound frame, in bytes.
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// The dispatcher actions are routed to.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle one raw text frame from `connection`, whose identity is `sender`.
    pub fn on_frame(
        &self,
        connection: &ConnectionId,
        sender: Option<&UserId>,
        raw: &str,
    ) -> RouteOutcome {
        let envelope = match codec::decode_with_limit(raw, self.max_frame_size) {
            Ok(envelope) => envelope,
            Err(ProtocolError::UnknownAction(action)) => {
                warn!(connection = %connection, action = %action, "Unknown action, discarding");
                return RouteOutcome::UnknownAction(action);
            }
            Err(e) => {
                warn!(connection = %connection, error = %e, "Malformed frame, discarding");
                return RouteOutcome::Malformed;
            }
        };

        debug!(
            connection = %connection,
            user = sender.map(UserId::as_str),
            action = %envelope.action,
            "Received action"
        );

        match self.route(sender, &envelope) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    connection = %connection,
                    action = %envelope.action,
                    error = %e,
                    "Malformed action payload, discarding"
                );
                RouteOutcome::Malformed
            }
        }
    }

    fn route(
        &self,
        sender: Option<&UserId>,
        envelope: &InboundEnvelope,
    ) -> Result<RouteOutcome, ProtocolError> {
        let action = envelope.action;
        let sender = sender.cloned();

        match action {
            ActionKind::Message => {
                let mut data = envelope.message_data()?;
                let Some(target) = data.sendee_id.take() else {
                    return Ok(self.no_target(action));
                };
                let delivery = self.dispatcher.deliver_message(&target, sender, data);
                Ok(RouteOutcome::Delivered {
                    action,
                    target,
                    delivery,
                })
            }
            ActionKind::Like
            | ActionKind::UpdateLikeId
            | ActionKind::RemoveLike
            | ActionKind::Comment
            | ActionKind::Follow => {
                let mut data = envelope.notification_data()?;
                let Some(target) = data.user_id.take() else {
                    return Ok(self.no_target(action));
                };
                let delivery = self
                    .dispatcher
                    .deliver_notification(&target, action, sender, data);
                Ok(RouteOutcome::Delivered {
                    action,
                    target,
                    delivery,
                })
            }
        }
    }

    fn no_target(&self, action: ActionKind) -> RouteOutcome {
        warn!(action = %action, "Action has no recipient, discarding");
        RouteOutcome::NoTarget(action)
    }
}
