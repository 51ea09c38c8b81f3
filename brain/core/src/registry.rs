//! Connection Registry - Live Face Connections
//!
//! The `ConnectionRegistry` tracks every face that is currently connected and
//! fans outbound events out to all of them.
//!
//! # Architecture
//!
//! ```text
//!                    ConnectionRegistry
//!                   ┌─────────────────────────────────────────┐
//!                   │ HashMap<ConnectionId, ConnectionHandle> │
//!                   │   - wrapped in Arc<RwLock<>>            │
//!                   └────────────────┬────────────────────────┘
//!                                    │ snapshot (ids + senders)
//!              ┌─────────────────────┼─────────────────────┐
//!              │                     │                     │
//!       ┌──────▼──────┐       ┌──────▼──────┐       ┌──────▼──────┐
//!       │   conn-1    │       │   conn-2    │       │   conn-3    │
//!       │ mpsc -> ws  │       │ mpsc -> ws  │       │ mpsc -> ws  │
//!       └─────────────┘       └─────────────┘       └─────────────┘
//! ```
//!
//! # Broadcast Semantics
//!
//! A broadcast copies the current members out of the lock and then sends
//! without holding it, so connects and disconnects during a broadcast never
//! disturb the pass in progress. A member whose channel is closed or does not
//! accept the event within the send timeout is pruned after the pass. Failures
//! never surface to the caller as errors.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::messages::OutboundEvent;

/// Default time a single connection gets to accept an event
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Unique identifier for a face connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create a new unique connection ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Handle to a connected face
///
/// The transport owns the other end of `tx` and writes whatever arrives to
/// the socket. A closed channel means the socket is gone.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection identifier
    pub id: ConnectionId,
    /// Channel to the connection's writer
    pub tx: mpsc::Sender<OutboundEvent>,
    /// When the face connected
    pub connected_at: Instant,
    /// Remote address, if the transport knows it
    pub peer: Option<String>,
}

impl ConnectionHandle {
    /// Create a new connection handle
    #[must_use]
    pub fn new(id: ConnectionId, tx: mpsc::Sender<OutboundEvent>) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
            peer: None,
        }
    }

    /// Attach the remote address
    #[must_use]
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    /// Check if the writer side is still alive
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Get the connection uptime in seconds
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.connected_at.elapsed().as_secs()
    }
}

/// Result of a broadcast operation
#[derive(Debug, Clone, Default)]
pub struct BroadcastResult {
    /// Number of connections that accepted the event
    pub successful: usize,
    /// Number of connections that failed and were pruned
    pub failed: usize,
    /// IDs of the pruned connections
    pub failed_ids: Vec<ConnectionId>,
}

impl BroadcastResult {
    /// Check if every member accepted the event
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Check if nobody received the event
    #[must_use]
    pub fn nobody_received(&self) -> bool {
        self.successful == 0
    }
}

/// Registry of live face connections
///
/// Cloning is cheap and every clone shares the same membership.
#[derive(Clone)]
pub struct ConnectionRegistry {
    /// Inner map of connection ID to handle
    inner: Arc<RwLock<HashMap<ConnectionId, ConnectionHandle>>>,
    /// Per-connection send deadline
    send_timeout: Duration,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::with_send_timeout(DEFAULT_SEND_TIMEOUT)
    }

    /// Create a registry with a custom per-connection send timeout
    #[must_use]
    pub fn with_send_timeout(send_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            send_timeout,
        }
    }

    /// Register a new connection
    pub fn register(&self, handle: ConnectionHandle) -> ConnectionId {
        let id = handle.id;
        let total = {
            let mut inner = self.inner.write();
            inner.insert(id, handle);
            inner.len()
        };
        tracing::info!(connection_id = %id, total, "Face connected");
        id
    }

    /// Unregister a connection
    ///
    /// Returns the handle if it was still registered.
    pub fn unregister(&self, id: &ConnectionId) -> Option<ConnectionHandle> {
        let (handle, remaining) = {
            let mut inner = self.inner.write();
            let handle = inner.remove(id);
            (handle, inner.len())
        };
        if let Some(ref handle) = handle {
            tracing::info!(
                connection_id = %id,
                uptime_secs = handle.uptime_secs(),
                remaining,
                "Face disconnected"
            );
        }
        handle
    }

    /// Get the number of live connections
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.read().len()
    }

    /// Check if the registry has no members
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Check if a connection is registered
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.inner.read().contains_key(id)
    }

    /// Copy the current membership out of the lock
    fn snapshot(&self) -> Vec<(ConnectionId, mpsc::Sender<OutboundEvent>)> {
        let inner = self.inner.read();
        inner.iter().map(|(id, h)| (*id, h.tx.clone())).collect()
    }

    /// Deliver one event to one sender within the send timeout
    async fn deliver(&self, tx: &mpsc::Sender<OutboundEvent>, event: OutboundEvent) -> bool {
        matches!(
            tokio::time::timeout(self.send_timeout, tx.send(event)).await,
            Ok(Ok(()))
        )
    }

    /// Remove connections that failed a send
    fn prune(&self, failed_ids: &[ConnectionId]) {
        if failed_ids.is_empty() {
            return;
        }
        let remaining = {
            let mut inner = self.inner.write();
            for id in failed_ids {
                inner.remove(id);
            }
            inner.len()
        };
        for id in failed_ids {
            tracing::warn!(connection_id = %id, "Send failed, dropping face connection");
        }
        tracing::debug!(
            pruned = failed_ids.len(),
            remaining,
            "Pruned failed connections"
        );
    }

    /// Broadcast an event to every live connection
    ///
    /// Iterates a snapshot taken at call time. Connections that fail are
    /// removed after the pass; the remaining sends are unaffected.
    pub async fn broadcast(&self, event: &OutboundEvent) -> BroadcastResult {
        let members = self.snapshot();
        tracing::debug!(
            event_type = crate::codec::WireEvent::event_type(event),
            recipients = members.len(),
            "Brain -> face"
        );

        let mut result = BroadcastResult::default();
        for (id, tx) in members {
            if self.deliver(&tx, event.clone()).await {
                result.successful += 1;
            } else {
                result.failed += 1;
                result.failed_ids.push(id);
            }
        }

        self.prune(&result.failed_ids);
        result
    }

    /// Send an event to one connection only
    ///
    /// Returns true if the connection accepted it. A failed send prunes the
    /// connection just like a failed broadcast.
    pub async fn send_to(&self, id: &ConnectionId, event: OutboundEvent) -> bool {
        let tx = self.inner.read().get(id).map(|h| h.tx.clone());

        let Some(tx) = tx else {
            tracing::warn!(connection_id = %id, "Attempted to send to unknown connection");
            return false;
        };

        let delivered = self.deliver(&tx, event).await;
        if !delivered {
            self.prune(&[*id]);
        }
        delivered
    }

    /// Remove connections whose writer has already gone away
    ///
    /// Returns the number of connections removed.
    pub fn cleanup_disconnected(&self) -> usize {
        let mut inner = self.inner.write();
        let before = inner.len();

        inner.retain(|id, handle| {
            let connected = handle.is_connected();
            if !connected {
                tracing::info!(connection_id = %id, "Removing closed face connection");
            }
            connected
        });

        before - inner.len()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ConnectionRegistry")
            .field("connection_count", &inner.len())
            .field("connections", &inner.keys().collect::<Vec<_>>())
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::StateValue;

    fn create_test_handle() -> (ConnectionHandle, mpsc::Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel(32);
        (ConnectionHandle::new(ConnectionId::new(), tx), rx)
    }

    fn thinking() -> OutboundEvent {
        OutboundEvent::state(StateValue::Thinking)
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId(42);
        assert_eq!(format!("{id}"), "conn-42");
    }

    #[test]
    fn test_connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_register_unregister() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = create_test_handle();
        let id = handle.id;

        assert_eq!(registry.register(handle), id);
        assert_eq!(registry.count(), 1);
        assert!(registry.contains(&id));

        assert!(registry.unregister(&id).is_some());
        assert!(registry.is_empty());
        assert!(registry.unregister(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_reports_uptime() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = create_test_handle();
        let id = registry.register(handle);

        tokio::time::advance(Duration::from_secs(90)).await;

        let handle = registry.unregister(&id).unwrap();
        assert_eq!(handle.uptime_secs(), 90);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone() {
        let registry = ConnectionRegistry::new();
        let (handle1, mut rx1) = create_test_handle();
        let (handle2, mut rx2) = create_test_handle();
        registry.register(handle1);
        registry.register(handle2);

        let result = registry.broadcast(&thinking()).await;

        assert!(result.all_succeeded());
        assert_eq!(result.successful, 2);
        assert_eq!(rx1.recv().await, Some(thinking()));
        assert_eq!(rx2.recv().await, Some(thinking()));
    }

    #[tokio::test]
    async fn test_broadcast_prunes_closed_connection() {
        let registry = ConnectionRegistry::new();
        let (alive, mut alive_rx) = create_test_handle();
        let (dead, dead_rx) = create_test_handle();
        let alive_id = alive.id;
        let dead_id = dead.id;
        registry.register(alive);
        registry.register(dead);

        // Face closes before the broadcast
        drop(dead_rx);

        let result = registry.broadcast(&thinking()).await;

        assert_eq!(result.successful, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.failed_ids, vec![dead_id]);
        assert_eq!(registry.count(), 1);
        assert!(registry.contains(&alive_id));
        assert!(!registry.contains(&dead_id));
        assert_eq!(alive_rx.recv().await, Some(thinking()));

        // Later broadcasts no longer consider the pruned connection
        let result = registry.broadcast(&OutboundEvent::speaking_end()).await;
        assert!(result.all_succeeded());
        assert_eq!(result.successful, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_prunes_stalled_connection() {
        let registry = ConnectionRegistry::with_send_timeout(Duration::from_millis(50));

        // Capacity 1 and nobody reading: the second send stalls
        let (tx, _stalled_rx) = mpsc::channel(1);
        let stalled = ConnectionHandle::new(ConnectionId::new(), tx);
        let stalled_id = stalled.id;
        registry.register(stalled);

        let (healthy, mut healthy_rx) = create_test_handle();
        registry.register(healthy);

        let first = registry.broadcast(&thinking()).await;
        assert!(first.all_succeeded());

        let second = registry.broadcast(&OutboundEvent::speaking_end()).await;
        assert_eq!(second.failed_ids, vec![stalled_id]);
        assert_eq!(registry.count(), 1);

        assert_eq!(healthy_rx.recv().await, Some(thinking()));
        assert_eq!(healthy_rx.recv().await, Some(OutboundEvent::speaking_end()));
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_registry() {
        let registry = ConnectionRegistry::new();
        let result = registry.broadcast(&thinking()).await;
        assert!(result.nobody_received());
        assert!(result.all_succeeded());
    }

    #[tokio::test]
    async fn test_send_to_targets_one_connection() {
        let registry = ConnectionRegistry::new();
        let (handle1, mut rx1) = create_test_handle();
        let (handle2, mut rx2) = create_test_handle();
        let id1 = handle1.id;
        registry.register(handle1);
        registry.register(handle2);

        assert!(registry.send_to(&id1, OutboundEvent::contract_info("v1")).await);

        assert_eq!(rx1.recv().await, Some(OutboundEvent::contract_info("v1")));
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_unknown_connection() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.send_to(&ConnectionId::new(), thinking()).await);
    }

    #[tokio::test]
    async fn test_send_to_failure_prunes() {
        let registry = ConnectionRegistry::new();
        let (handle, rx) = create_test_handle();
        let id = handle.id;
        registry.register(handle);
        drop(rx);

        assert!(!registry.send_to(&id, thinking()).await);
        assert!(!registry.contains(&id));
    }

    #[test]
    fn test_cleanup_disconnected() {
        let registry = ConnectionRegistry::new();
        let (handle, rx) = create_test_handle();
        registry.register(handle);

        drop(rx);

        assert_eq!(registry.cleanup_disconnected(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_clone_is_shared() {
        let registry1 = ConnectionRegistry::new();
        let registry2 = registry1.clone();
        let (handle, _rx) = create_test_handle();
        let id = handle.id;

        registry1.register(handle);

        assert!(registry2.contains(&id));
        assert_eq!(registry2.count(), 1);
    }

    #[tokio::test]
    async fn test_registration_during_broadcast() {
        use tokio::task::JoinSet;

        let registry = ConnectionRegistry::new();
        let mut receivers = Vec::new();
        for _ in 0..5 {
            let (handle, rx) = create_test_handle();
            registry.register(handle);
            receivers.push(rx);
        }

        let mut join_set = JoinSet::new();
        for _ in 0..10 {
            let registry = registry.clone();
            join_set.spawn(async move { registry.broadcast(&thinking()).await });
        }
        for _ in 0..5 {
            let registry = registry.clone();
            join_set.spawn(async move {
                let (tx, _rx) = mpsc::channel(32);
                let id = registry.register(ConnectionHandle::new(ConnectionId::new(), tx));
                registry.unregister(&id);
                BroadcastResult::default()
            });
        }

        while let Some(result) = join_set.join_next().await {
            assert!(result.is_ok());
        }

        // The first five saw every broadcast exactly once
        for mut rx in receivers {
            let mut count = 0;
            while rx.try_recv().is_ok() {
                count += 1;
            }
            assert_eq!(count, 10);
        }
        assert_eq!(registry.count(), 5);
    }
}
