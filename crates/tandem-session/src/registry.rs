//! The connection registry: every participant the server currently knows.
//!
//! A participant is registered on its first handshake and removed when it
//! disconnects (explicitly, by closing its socket, or by the idle reaper).
//! All operations go through one async mutex, so check-and-insert in
//! [`ConnectionRegistry::register`] is atomic: concurrent handshakes with
//! the same id end up sharing one [`Connection`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tandem_protocol::ClientId;
use tokio::sync::Mutex;

use crate::{Connection, DEFAULT_OUTBOX_CAPACITY};

/// Maps client ids to their live [`Connection`].
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ClientId, Arc<Connection>>>,
    outbox_capacity: usize,
}

impl ConnectionRegistry {
    /// Creates an empty registry whose connections buffer up to
    /// `outbox_capacity` events each.
    pub fn new(outbox_capacity: usize) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            outbox_capacity,
        }
    }

    /// Returns the connection for `client_id`, creating it if needed.
    ///
    /// The flag is `true` when this call created it.
    pub async fn register(&self, client_id: ClientId) -> (Arc<Connection>, bool) {
        self.entry(client_id, 0, false).await
    }

    /// Registers `client_id` for the socket `owner`, taking the connection
    /// over if another socket held it. Used by the handshake.
    pub async fn claim(&self, client_id: ClientId, owner: u64) -> (Arc<Connection>, bool) {
        self.entry(client_id, owner, true).await
    }

    /// Returns the connection for `client_id`, creating it for `owner` if
    /// it is missing. An existing connection keeps its owner.
    pub async fn resolve(&self, client_id: ClientId, owner: u64) -> (Arc<Connection>, bool) {
        self.entry(client_id, owner, false).await
    }

    async fn entry(&self, client_id: ClientId, owner: u64, take_over: bool) -> (Arc<Connection>, bool) {
        let mut connections = self.connections.lock().await;
        if let Some(existing) = connections.get(&client_id) {
            existing.touch();
            let previous = existing.owner();
            if take_over && previous != owner {
                existing.set_owner(owner);
                tracing::info!(%client_id, previous, owner, "connection claimed by new socket");
            }
            return (Arc::clone(existing), false);
        }
        let conn = Arc::new(Connection::new(client_id.clone(), self.outbox_capacity));
        conn.set_owner(owner);
        connections.insert(client_id.clone(), Arc::clone(&conn));
        tracing::info!(%client_id, owner, "connection registered");
        (conn, true)
    }

    pub async fn lookup(&self, client_id: &ClientId) -> Option<Arc<Connection>> {
        self.connections.lock().await.get(client_id).cloned()
    }

    /// Removes the connection and closes its outbox, which ends any open
    /// event stream. Leaving the room is the caller's job.
    pub async fn remove(&self, client_id: &ClientId) -> Option<Arc<Connection>> {
        let removed = self.connections.lock().await.remove(client_id);
        if let Some(conn) = &removed {
            conn.outbox().close();
            tracing::info!(%client_id, "connection removed");
        }
        removed
    }

    /// Like [`remove`](Self::remove), but only if `owner` still owns the
    /// connection. A socket that was taken over leaves it alone.
    pub async fn remove_owned(&self, client_id: &ClientId, owner: u64) -> Option<Arc<Connection>> {
        let mut connections = self.connections.lock().await;
        if connections.get(client_id).is_none_or(|c| c.owner() != owner) {
            return None;
        }
        let removed = connections.remove(client_id);
        drop(connections);
        if let Some(conn) = &removed {
            conn.outbox().close();
            tracing::info!(%client_id, owner, "connection removed");
        }
        removed
    }

    /// Records activity for `client_id`. Returns `false` if unknown.
    pub async fn touch(&self, client_id: &ClientId) -> bool {
        match self.connections.lock().await.get(client_id) {
            Some(conn) => {
                conn.touch();
                true
            }
            None => false,
        }
    }

    /// Clients idle for longer than `max_idle` that have no open stream.
    ///
    /// A subscribed client is never idle: its socket is held open by the
    /// stream even when it makes no calls.
    pub async fn idle(&self, max_idle: Duration) -> Vec<ClientId> {
        self.connections
            .lock()
            .await
            .values()
            .filter(|c| !c.is_streaming() && c.idle_for() > max_idle)
            .map(|c| c.client_id().clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOX_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for `ConnectionRegistry`. Concurrency tests live in
    //! `tests/registry.rs`.

    use super::*;

    fn cid(raw: &str) -> ClientId {
        ClientId::parse(raw).unwrap()
    }

    // =====================================================================
    // register()
    // =====================================================================

    #[tokio::test]
    async fn test_register_new_client_creates_connection() {
        let registry = ConnectionRegistry::default();
        let (conn, created) = registry.register(cid("ALICE")).await;
        assert!(created);
        assert_eq!(conn.client_id(), &cid("ALICE"));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = ConnectionRegistry::default();
        let (first, _) = registry.register(cid("ALICE")).await;
        let (second, created) = registry.register(cid("ALICE")).await;
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_register_uses_configured_outbox_capacity() {
        let registry = ConnectionRegistry::new(3);
        let (conn, _) = registry.register(cid("ALICE")).await;
        assert_eq!(conn.outbox().capacity(), 3);
    }

    // =====================================================================
    // lookup() / remove()
    // =====================================================================

    #[tokio::test]
    async fn test_lookup_unknown_returns_none() {
        let registry = ConnectionRegistry::default();
        assert!(registry.lookup(&cid("NOBODY")).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_closes_outbox() {
        let registry = ConnectionRegistry::default();
        let (conn, _) = registry.register(cid("ALICE")).await;

        let removed = registry.remove(&cid("ALICE")).await.expect("was registered");
        assert!(Arc::ptr_eq(&conn, &removed));
        assert!(conn.outbox().is_closed());
        assert!(registry.lookup(&cid("ALICE")).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_unknown_returns_none() {
        let registry = ConnectionRegistry::default();
        assert!(registry.remove(&cid("NOBODY")).await.is_none());
    }

    #[tokio::test]
    async fn test_register_after_remove_creates_fresh_connection() {
        let registry = ConnectionRegistry::default();
        let (old, _) = registry.register(cid("ALICE")).await;
        registry.remove(&cid("ALICE")).await;

        let (new, created) = registry.register(cid("ALICE")).await;
        assert!(created);
        assert!(!Arc::ptr_eq(&old, &new));
        assert!(!new.outbox().is_closed());
    }

    // =====================================================================
    // claim() / remove_owned()
    // =====================================================================

    #[tokio::test]
    async fn test_claim_moves_ownership_to_new_socket() {
        let registry = ConnectionRegistry::default();
        let (first, created) = registry.claim(cid("ALICE"), 1).await;
        assert!(created);
        let (second, created) = registry.claim(cid("ALICE"), 2).await;
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.owner(), 2);
    }

    #[tokio::test]
    async fn test_resolve_keeps_existing_owner() {
        let registry = ConnectionRegistry::default();
        registry.claim(cid("ALICE"), 1).await;

        let (conn, created) = registry.resolve(cid("ALICE"), 2).await;
        assert!(!created);
        assert_eq!(conn.owner(), 1);

        registry.remove(&cid("ALICE")).await;
        let (fresh, created) = registry.resolve(cid("ALICE"), 2).await;
        assert!(created);
        assert_eq!(fresh.owner(), 2);
    }

    #[tokio::test]
    async fn test_remove_owned_ignores_previous_owner() {
        let registry = ConnectionRegistry::default();
        registry.claim(cid("ALICE"), 1).await;
        let (conn, _) = registry.claim(cid("ALICE"), 2).await;

        assert!(registry.remove_owned(&cid("ALICE"), 1).await.is_none());
        assert!(!conn.outbox().is_closed());

        assert!(registry.remove_owned(&cid("ALICE"), 2).await.is_some());
        assert!(conn.outbox().is_closed());
        assert!(registry.lookup(&cid("ALICE")).await.is_none());
    }

    // =====================================================================
    // touch() / idle()
    // =====================================================================

    #[tokio::test]
    async fn test_touch_unknown_returns_false() {
        let registry = ConnectionRegistry::default();
        assert!(!registry.touch(&cid("NOBODY")).await);
    }

    #[tokio::test]
    async fn test_idle_lists_quiet_clients_without_stream() {
        let registry = ConnectionRegistry::default();
        registry.register(cid("QUIET")).await;
        let (streaming, _) = registry.register(cid("STREAM")).await;
        let _lease = streaming.open_stream();

        tokio::time::sleep(Duration::from_millis(30)).await;
        registry.register(cid("BUSY")).await;

        let idle = registry.idle(Duration::from_millis(20)).await;
        assert_eq!(idle, vec![cid("QUIET")]);
    }
}
