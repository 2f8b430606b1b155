//! Process-wide map from authenticated user id to the connection serving it.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use super::SERVER_TARGET;

/// Unique identifier of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Cross-task handle to a live connection.
///
/// Closing is a cancellation: the owning worker selects on it while waiting
/// for the next line and tears the socket down when it fires. Closing an
/// already closed handle is a no-op.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: SocketAddr,
    closed: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(peer: SocketAddr, closed: CancellationToken) -> Self {
        Self {
            id: ConnectionId::new(),
            peer,
            closed,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn force_close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub(crate) async fn closed(&self) {
        self.closed.cancelled().await;
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<i64, Arc<ConnectionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last writer wins; a replaced connection stays open.
    pub fn register(
        &self,
        user_id: i64,
        handle: Arc<ConnectionHandle>,
    ) -> Option<Arc<ConnectionHandle>> {
        let previous = self.sessions.insert(user_id, handle);
        if let Some(previous) = &previous {
            info!(
                target: SERVER_TARGET,
                user_id,
                previous = %previous.id(),
                "user logged in from a second connection"
            );
        }
        previous
    }

    pub fn unregister(&self, user_id: i64) -> bool {
        self.sessions.remove(&user_id).is_some()
    }

    /// Removes the entry only while it still belongs to `connection`.
    pub fn release(&self, user_id: i64, connection: ConnectionId) -> bool {
        self.sessions
            .remove_if(&user_id, |_, handle| handle.id() == connection)
            .is_some()
    }

    /// Force-closes the user's connection. Returns `false` when nobody is
    /// logged in under that id.
    pub fn evict(&self, user_id: i64) -> bool {
        match self.sessions.remove(&user_id) {
            Some((_, handle)) => {
                info!(
                    target: SERVER_TARGET,
                    user_id,
                    connection = %handle.id(),
                    peer = %handle.peer(),
                    "evicting session"
                );
                handle.force_close();
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, user_id: i64) -> Option<Arc<ConnectionHandle>> {
        let handle = self.sessions.get(&user_id).map(|entry| Arc::clone(entry.value()))?;
        if handle.is_closed() {
            // 连接已关闭但尚未注销
            self.sessions
                .remove_if(&user_id, |_, current| current.id() == handle.id());
            return None;
        }
        Some(handle)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn logged_in(&self) -> Vec<(i64, SocketAddr)> {
        let mut users: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().peer()))
            .collect();
        users.sort_by_key(|(user_id, _)| *user_id);
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> Arc<ConnectionHandle> {
        let peer = "127.0.0.1:40000".parse().unwrap();
        Arc::new(ConnectionHandle::new(peer, CancellationToken::new()))
    }

    #[test]
    fn evicting_an_unknown_user_is_a_no_op() {
        let registry = SessionRegistry::new();
        assert!(!registry.evict(42));
        assert!(registry.is_empty());
    }

    #[test]
    fn evict_closes_the_connection_and_removes_the_entry() {
        let registry = SessionRegistry::new();
        let connection = handle();
        registry.register(7, Arc::clone(&connection));

        assert!(registry.evict(7));
        assert!(connection.is_closed());
        assert!(registry.lookup(7).is_none());
        // 与连接自身的清理竞争时结果一致
        assert!(!registry.release(7, connection.id()));
        assert!(!registry.evict(7));
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = SessionRegistry::new();
        registry.register(1, handle());
        assert!(registry.unregister(1));
        assert!(!registry.unregister(1));
    }

    #[test]
    fn last_writer_wins_without_closing_the_first_connection() {
        let registry = SessionRegistry::new();
        let first = handle();
        let second = handle();
        registry.register(3, Arc::clone(&first));
        let replaced = registry.register(3, Arc::clone(&second));

        assert_eq!(replaced.map(|h| h.id()), Some(first.id()));
        assert!(!first.is_closed());
        assert_eq!(registry.lookup(3).map(|h| h.id()), Some(second.id()));

        // 旧连接的清理不能删除新登录
        assert!(!registry.release(3, first.id()));
        assert_eq!(registry.len(), 1);
        assert!(registry.release(3, second.id()));
        assert!(registry.is_empty());
    }

    #[test]
    fn stale_entries_heal_on_lookup() {
        let registry = SessionRegistry::new();
        let connection = handle();
        registry.register(5, Arc::clone(&connection));
        connection.force_close();

        assert!(registry.lookup(5).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registrations_keep_every_user() {
        let registry = SessionRegistry::new();
        let mut tasks = Vec::new();
        for user_id in 0..64 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let connection = handle();
                registry.register(user_id, Arc::clone(&connection));
                connection.id()
            }));
        }

        let mut expected = Vec::new();
        for (user_id, task) in tasks.into_iter().enumerate() {
            expected.push((user_id as i64, task.await.expect("join")));
        }

        assert_eq!(registry.len(), 64);
        for (user_id, connection) in expected {
            assert_eq!(registry.lookup(user_id).map(|h| h.id()), Some(connection));
        }
    }
}
