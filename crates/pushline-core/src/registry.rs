//! Connection registry.
//!
//! The registry is the only state shared between connection tasks. It maps
//! connection ids to their identity and outbox, and identities to the set of
//! connections currently open for them.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pushline_protocol::UserId;
use pushline_transport::ConnectionId;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Sending half of a connection's outbound queue.
///
/// Frames pushed here are written to the transport by the connection's own
/// task, in order.
pub type Outbox = mpsc::UnboundedSender<String>;

/// A live connection that can be delivered to.
#[derive(Debug, Clone)]
pub struct Recipient {
    /// The connection.
    pub connection_id: ConnectionId,
    /// Its outbound queue.
    pub outbox: Outbox,
}

struct RegistryEntry {
    identity: Option<UserId>,
    outbox: Outbox,
}

/// Registry of open connections.
pub struct Registry {
    /// Every open connection, identified or not.
    connections: DashMap<ConnectionId, RegistryEntry>,
    /// Identity -> connections open for it. Never holds an empty set.
    users: DashMap<UserId, HashMap<ConnectionId, Outbox>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            users: DashMap::new(),
        }
    }

    /// Register an open connection.
    ///
    /// Connections without an identity are tracked but never returned by
    /// [`find_live_connections_for`](Self::find_live_connections_for).
    /// Registering an id twice replaces the earlier registration.
    pub fn register(&self, connection_id: ConnectionId, identity: Option<UserId>, outbox: Outbox) {
        if self.connections.contains_key(&connection_id) {
            self.unregister(&connection_id);
        }

        if let Some(user) = &identity {
            self.users
                .entry(user.clone())
                .or_default()
                .insert(connection_id.clone(), outbox.clone());
        }

        debug!(
            connection = %connection_id,
            user = identity.as_ref().map(UserId::as_str),
            "Registered connection"
        );

        self.connections
            .insert(connection_id, RegistryEntry { identity, outbox });
    }

    /// Remove a connection.
    ///
    /// Returns `true` if the connection was registered. Calling this again
    /// for the same connection is a no-op.
    pub fn unregister(&self, connection_id: &ConnectionId) -> bool {
        let Some((_, entry)) = self.connections.remove(connection_id) else {
            return false;
        };

        if let Some(user) = entry.identity {
            if let Entry::Occupied(mut set) = self.users.entry(user) {
                set.get_mut().remove(connection_id);
                if set.get().is_empty() {
                    set.remove();
                }
            }
        }

        debug!(connection = %connection_id, "Unregistered connection");
        true
    }

    /// Live connections registered under `user`.
    ///
    /// The result is a snapshot; a connection may close before the caller
    /// writes to it. Returns an empty list for unknown identities.
    #[must_use]
    pub fn find_live_connections_for(&self, user: &UserId) -> Vec<Recipient> {
        self.users
            .get(user)
            .map(|set| {
                set.iter()
                    .map(|(id, outbox)| Recipient {
                        connection_id: id.clone(),
                        outbox: outbox.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Check if a connection is registered.
    #[must_use]
    pub fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Identity a connection was registered with.
    #[must_use]
    pub fn identity_of(&self, connection_id: &ConnectionId) -> Option<UserId> {
        self.connections
            .get(connection_id)
            .and_then(|entry| entry.identity.clone())
    }

    /// Outbox of a registered connection.
    #[must_use]
    pub fn outbox_of(&self, connection_id: &ConnectionId) -> Option<Outbox> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.outbox.clone())
    }

    /// Number of connections registered under `user`.
    #[must_use]
    pub fn connection_count_for(&self, user: &UserId) -> usize {
        self.users.get(user).map(|set| set.len()).unwrap_or(0)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            connections: self.connections.len(),
            identified: self
                .connections
                .iter()
                .filter(|entry| entry.identity.is_some())
                .count(),
            users: self.users.len(),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of open connections.
    pub connections: usize,
    /// Number of open connections with an identity.
    pub identified: usize,
    /// Number of distinct identities.
    pub users: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn outbox() -> (Outbox, mpsc::UnboundedReceiver<String>) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn test_register_unregister() {
        let registry = Registry::new();
        let (tx, _rx) = outbox();
        let id = ConnectionId::new("conn-1");
        let user = UserId::new("2");

        registry.register(id.clone(), Some(user.clone()), tx);
        assert!(registry.is_registered(&id));
        assert_eq!(registry.identity_of(&id), Some(user.clone()));
        assert_eq!(registry.find_live_connections_for(&user).len(), 1);

        assert!(registry.unregister(&id));
        assert!(!registry.is_registered(&id));
        assert!(registry.find_live_connections_for(&user).is_empty());
        assert_eq!(registry.stats().users, 0);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = Registry::new();
        let (tx, _rx) = outbox();
        let id = ConnectionId::new("conn-1");

        registry.register(id.clone(), Some("2".into()), tx);
        assert!(registry.unregister(&id));
        assert!(!registry.unregister(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_anonymous_connection_is_unreachable() {
        let registry = Registry::new();
        let (tx, _rx) = outbox();
        let id = ConnectionId::new("conn-anon");

        registry.register(id.clone(), None, tx);
        assert!(registry.is_registered(&id));
        assert_eq!(
            registry.stats(),
            RegistryStats {
                connections: 1,
                identified: 0,
                users: 0
            }
        );
        assert!(registry.find_live_connections_for(&UserId::new("")).is_empty());
    }

    #[test]
    fn test_multiple_connections_per_user() {
        let registry = Registry::new();
        let user = UserId::new("7");
        let (tx1, _rx1) = outbox();
        let (tx2, _rx2) = outbox();

        registry.register("tab-1".into(), Some(user.clone()), tx1);
        registry.register("tab-2".into(), Some(user.clone()), tx2);
        assert_eq!(registry.connection_count_for(&user), 2);

        registry.unregister(&"tab-1".into());
        let live = registry.find_live_connections_for(&user);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].connection_id.as_str(), "tab-2");
    }

    #[test]
    fn test_reregister_moves_identity() {
        let registry = Registry::new();
        let id = ConnectionId::new("conn-1");
        let (tx, _rx) = outbox();

        registry.register(id.clone(), Some("a".into()), tx.clone());
        registry.register(id.clone(), Some("b".into()), tx);

        assert!(registry.find_live_connections_for(&"a".into()).is_empty());
        assert_eq!(registry.find_live_connections_for(&"b".into()).len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_unregister() {
        let registry = Arc::new(Registry::new());
        let mut handles = Vec::new();

        for i in 0..200 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let (tx, _rx) = mpsc::unbounded_channel();
                let id = ConnectionId::new(format!("conn-{}", i));
                let user = UserId::new(format!("user-{}", i % 10));

                registry.register(id.clone(), Some(user.clone()), tx);
                tokio::task::yield_now().await;
                let _ = registry.find_live_connections_for(&user);

                // Keep every third connection open
                if i % 3 != 0 {
                    registry.unregister(&id);
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let expected = (0..200).filter(|i| i % 3 == 0).count();
        assert_eq!(registry.len(), expected);

        let per_user: usize = (0..10)
            .map(|u| registry.connection_count_for(&UserId::new(format!("user-{}", u))))
            .sum();
        assert_eq!(per_user, expected);
        for i in 0..200 {
            let id = ConnectionId::new(format!("conn-{}", i));
            assert_eq!(registry.is_registered(&id), i % 3 == 0);
        }
    }
}
