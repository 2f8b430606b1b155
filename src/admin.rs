//! Administrative control surface.
//!
//! The server reports connection lifecycle events through
//! [`ConnectionObserver`]; [`AdminControl`] exposes eviction and read-only
//! snapshots to whatever operator tooling embeds the server.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::SqlitePool;
use tracing::info;

use crate::AppState;
use crate::routes::movie::Movie;
use crate::routes::user::User;
use crate::server::{ConnectionId, SessionRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub opened_at: DateTime<Utc>,
}

pub trait ConnectionObserver: Send + Sync + 'static {
    fn connection_opened(&self, info: &ConnectionInfo);
    fn connection_closed(&self, info: &ConnectionInfo);
}

/// Live listing of open connections.
#[derive(Debug, Default)]
pub struct ActiveConnections {
    connections: DashMap<ConnectionId, ConnectionInfo>,
}

impl ActiveConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        let mut connections: Vec<_> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        connections.sort_by_key(|info| info.opened_at);
        connections
    }
}

impl ConnectionObserver for ActiveConnections {
    fn connection_opened(&self, info: &ConnectionInfo) {
        self.connections.insert(info.id, info.clone());
        info!(
            connection = %info.id,
            peer = %info.peer,
            active = self.connections.len(),
            "client connected"
        );
    }

    fn connection_closed(&self, info: &ConnectionInfo) {
        self.connections.remove(&info.id);
        info!(
            connection = %info.id,
            peer = %info.peer,
            active = self.connections.len(),
            "client disconnected"
        );
    }
}

pub struct AdminControl {
    sessions: SessionRegistry,
    connections: Arc<ActiveConnections>,
    pool: SqlitePool,
}

impl AdminControl {
    pub fn new(state: &AppState, connections: Arc<ActiveConnections>) -> Self {
        Self {
            sessions: state.sessions.clone(),
            connections,
            pool: state.pool.clone(),
        }
    }

    /// Forcibly disconnects a logged-in user; `false` if they are not online.
    pub fn evict(&self, user_id: i64) -> bool {
        self.sessions.evict(user_id)
    }

    pub fn active_connections(&self) -> Vec<ConnectionInfo> {
        self.connections.snapshot()
    }

    pub fn logged_in_users(&self) -> Vec<(i64, SocketAddr)> {
        self.sessions.logged_in()
    }

    pub async fn users_snapshot(&self) -> Result<Vec<User>, sqlx::Error> {
        User::list(&self.pool).await
    }

    pub async fn movies_snapshot(&self) -> Result<Vec<Movie>, sqlx::Error> {
        Movie::list(&self.pool).await
    }
}
