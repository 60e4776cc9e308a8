//! WebSocket connection manager.
//!
//! Tracks active WebSocket connections and fans snapshots out to them.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::ServerMessage;

/// Sender for WebSocket messages.
pub type MessageSender = mpsc::UnboundedSender<ServerMessage>;

/// Manages active WebSocket connections.
///
/// Thread-safe and can be shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    /// All active connections, keyed by connection ID.
    connections: DashMap<String, MessageSender>,
}

impl ConnectionManager {
    /// Create a new connection manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new connection manager wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a new connection.
    ///
    /// Returns the connection ID.
    pub fn register(&self, sender: MessageSender) -> String {
        let conn_id = uuid::Uuid::new_v4().to_string();
        self.connections.insert(conn_id.clone(), sender);

        tracing::info!(conn_id = %conn_id, "WebSocket connection registered");

        conn_id
    }

    /// Unregister a connection.
    pub fn unregister(&self, conn_id: &str) {
        if self.connections.remove(conn_id).is_some() {
            tracing::info!(conn_id = %conn_id, "WebSocket connection unregistered");
        }
    }

    /// Broadcast a message to all connections, dropping the ones whose
    /// socket task has gone away.
    ///
    /// Returns the number of connections that received the message.
    pub fn broadcast_all(&self, message: ServerMessage) -> usize {
        let mut sent_count = 0;

        self.connections.retain(|_, sender| {
            let delivered = sender.send(message.clone()).is_ok();
            if delivered {
                sent_count += 1;
            }
            delivered
        });

        tracing::debug!(recipients = sent_count, "Broadcast message to connections");

        sent_count
    }

    /// Send a message to a specific connection.
    pub fn send_to(&self, conn_id: &str, message: ServerMessage) -> bool {
        if let Some(sender) = self.connections.get(conn_id) {
            sender.send(message).is_ok()
        } else {
            false
        }
    }

    /// Get the number of active connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_engine::Record;

    #[test]
    fn test_register_unregister() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let conn_id = manager.register(tx);
        assert_eq!(manager.connection_count(), 1);

        manager.unregister(&conn_id);
        assert_eq!(manager.connection_count(), 0);
        assert!(!manager.send_to(&conn_id, ServerMessage::Pong));
    }

    #[test]
    fn test_broadcast_all() {
        let manager = ConnectionManager::new();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        manager.register(tx1);
        manager.register(tx2);

        let snapshot = ServerMessage::Snapshot {
            records: vec![Record::new("r1", Default::default())],
        };
        assert_eq!(manager.broadcast_all(snapshot.clone()), 2);

        assert_eq!(rx1.try_recv().unwrap(), snapshot);
        assert_eq!(rx2.try_recv().unwrap(), snapshot);
    }

    #[test]
    fn test_broadcast_prunes_closed_connections() {
        let manager = ConnectionManager::new();

        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        manager.register(tx1);
        manager.register(tx2);
        drop(rx1);

        assert_eq!(manager.broadcast_all(ServerMessage::Pong), 1);
        assert_eq!(manager.connection_count(), 1);
        assert!(matches!(rx2.try_recv().unwrap(), ServerMessage::Pong));
    }

    #[test]
    fn test_send_to_single_connection() {
        let manager = ConnectionManager::new();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let conn1 = manager.register(tx1);
        manager.register(tx2);

        assert!(manager.send_to(&conn1, ServerMessage::error("bad frame")));
        assert!(matches!(rx1.try_recv().unwrap(), ServerMessage::Error { .. }));
        assert!(rx2.try_recv().is_err());
    }
}
