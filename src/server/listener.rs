//! Accept loop with a bounded worker pool.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::admin::ConnectionObserver;

use super::SERVER_TARGET;
use super::connection::serve_connection;
use super::errors::ServerError;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Server {
    listener: TcpListener,
    state: AppState,
    observer: Arc<dyn ConnectionObserver>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl Server {
    /// Binds the listening socket. At most `config.max_connections` clients
    /// are served at once; further clients wait in the accept backlog.
    pub async fn bind(
        addr: SocketAddr,
        state: AppState,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let permits = Arc::new(Semaphore::new(state.config.max_connections.max(1)));
        Ok(Self {
            listener,
            state,
            observer,
            permits,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::LocalAddr)
    }

    /// Cancelling the returned token stops the accept loop and closes every
    /// open connection.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.local_addr()?;
        info!(
            target: SERVER_TARGET,
            %addr,
            max_connections = self.state.config.max_connections,
            "server listening"
        );

        loop {
            // 先占用工作槽位再 accept，超出的客户端留在 backlog 中
            let permit = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                permit = Arc::clone(&self.permits).acquire_owned() => {
                    permit.map_err(|_| ServerError::PoolClosed)?
                }
            };

            let (stream, peer) = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!(target: SERVER_TARGET, error = %e, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            if let Err(e) = stream.set_nodelay(true) {
                warn!(target: SERVER_TARGET, %peer, error = %e, "failed to set TCP_NODELAY");
            }
            debug!(target: SERVER_TARGET, %peer, "accepted connection");

            let state = self.state.clone();
            let observer = Arc::clone(&self.observer);
            let closed = self.shutdown.child_token();
            tokio::spawn(async move {
                serve_connection(stream, peer, state, observer, closed).await;
                drop(permit);
            });
        }

        info!(target: SERVER_TARGET, %addr, "server stopped accepting connections");
        Ok(())
    }
}
