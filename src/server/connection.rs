//! Per-connection worker: read a line, dispatch it, write the answer, repeat.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio_util::codec::{
    AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead, FramedWrite, LinesCodec,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::admin::{ConnectionInfo, ConnectionObserver};
use crate::error::AppError;
use crate::result::{ApiResponse, Status};
use crate::router::{self, Dispatched, Operation};

use super::SERVER_TARGET;
use super::registry::ConnectionHandle;

/// Why the read loop stopped.
#[derive(Debug)]
enum Exit {
    EndOfStream,
    SessionEnded,
    ForcedClose,
    LineTooLong,
    Transport(io::Error),
}

/// Serves one accepted socket until it closes.
///
/// `closed` is the connection's cancellation token; cancelling it (directly or
/// through the session registry) closes the socket.
pub async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: AppState,
    observer: Arc<dyn ConnectionObserver>,
    closed: CancellationToken,
) {
    let handle = Arc::new(ConnectionHandle::new(peer, closed));
    let mut connection = Connection::open(handle, state, observer);
    let exit = connection.run(stream).await;
    connection.report(exit);
}

struct Connection {
    handle: Arc<ConnectionHandle>,
    info: ConnectionInfo,
    state: AppState,
    observer: Arc<dyn ConnectionObserver>,
    user_id: Option<i64>,
}

impl Connection {
    fn open(
        handle: Arc<ConnectionHandle>,
        state: AppState,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Self {
        let info = ConnectionInfo {
            id: handle.id(),
            peer: handle.peer(),
            opened_at: Utc::now(),
        };
        observer.connection_opened(&info);
        Self {
            handle,
            info,
            state,
            observer,
            user_id: None,
        }
    }

    async fn run(&mut self, stream: TcpStream) -> Exit {
        let (reader, writer) = stream.into_split();
        let codec = AnyDelimiterCodec::new_with_max_length(
            b"\n".to_vec(),
            b"\n".to_vec(),
            self.state.config.max_line_bytes,
        );
        let mut requests = FramedRead::new(reader, codec);
        let mut responses = FramedWrite::new(writer, LinesCodec::new());

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.handle.closed() => return Exit::ForcedClose,
                frame = requests.next() => frame,
            };

            let chunk = match frame {
                None => return Exit::EndOfStream,
                Some(Ok(chunk)) => chunk,
                Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                    // 超长行之后无法恢复分帧，回复 422 后断开
                    let response = AppError::Malformed("linha excede o tamanho máximo".into())
                        .into_response();
                    if let Err(exit) = self.send(&mut responses, &response).await {
                        return exit;
                    }
                    return Exit::LineTooLong;
                }
                Some(Err(AnyDelimiterCodecError::Io(e))) => return Exit::Transport(e),
            };

            let line = match std::str::from_utf8(&chunk) {
                Ok(line) => line.trim_end_matches('\r'),
                Err(_) => {
                    let response =
                        AppError::Malformed("a linha não é UTF-8 válido".into()).into_response();
                    if let Err(exit) = self.send(&mut responses, &response).await {
                        return exit;
                    }
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            debug!(target: SERVER_TARGET, peer = %self.info.peer, "[CLIENTE->SERVIDOR] {}", line);
            let Dispatched {
                operation,
                response,
            } = router::dispatch(&self.state, line).await;

            if operation == Some(Operation::Login) && response.status == Status::OK {
                self.register_login(&response);
            }

            if let Err(exit) = self.send(&mut responses, &response).await {
                return exit;
            }

            if let Some(exit) = exit_after_response(operation, response.status, &self.handle) {
                return exit;
            }
        }
    }

    async fn send(
        &self,
        responses: &mut FramedWrite<OwnedWriteHalf, LinesCodec>,
        response: &ApiResponse,
    ) -> Result<(), Exit> {
        let line = response.to_line();
        debug!(target: SERVER_TARGET, peer = %self.info.peer, "[SERVIDOR->CLIENTE] {}", line);
        responses.send(line).await.map_err(|e| {
            Exit::Transport(match e {
                tokio_util::codec::LinesCodecError::Io(e) => e,
                other => io::Error::other(other),
            })
        })
    }

    /// Registers the session once per connection, from the token the LOGIN
    /// handler just issued.
    fn register_login(&mut self, response: &ApiResponse) {
        if self.user_id.is_some() {
            return;
        }
        let Some(token) = response.field("token").and_then(Value::as_str) else {
            warn!(target: SERVER_TARGET, peer = %self.info.peer, "login response without token");
            return;
        };
        match self.state.tokens.validate(token) {
            Ok(claims) => {
                self.state
                    .sessions
                    .register(claims.id, Arc::clone(&self.handle));
                self.user_id = Some(claims.id);
                info!(
                    target: SERVER_TARGET,
                    peer = %self.info.peer,
                    user_id = claims.id,
                    username = %claims.sub,
                    "user logged in"
                );
            }
            Err(e) => {
                warn!(target: SERVER_TARGET, peer = %self.info.peer, error = %e, "issued token failed validation");
            }
        }
    }

    fn report(&self, exit: Exit) {
        match exit {
            Exit::EndOfStream => {
                debug!(target: SERVER_TARGET, peer = %self.info.peer, "client closed connection")
            }
            Exit::SessionEnded => {
                debug!(target: SERVER_TARGET, peer = %self.info.peer, "session ended by client request")
            }
            Exit::ForcedClose => {
                info!(target: SERVER_TARGET, peer = %self.info.peer, "connection closed by server")
            }
            Exit::LineTooLong => {
                warn!(target: SERVER_TARGET, peer = %self.info.peer, "request line exceeded maximum size")
            }
            Exit::Transport(e) if self.handle.is_closed() || is_disconnect(&e) => {
                debug!(target: SERVER_TARGET, peer = %self.info.peer, error = %e, "client disconnected")
            }
            Exit::Transport(e) => {
                warn!(target: SERVER_TARGET, peer = %self.info.peer, error = %e, "connection I/O error")
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(user_id) = self.user_id.take() {
            self.state.sessions.release(user_id, self.handle.id());
        }
        self.handle.force_close();
        self.observer.connection_closed(&self.info);
    }
}

/// Decides whether the connection ends once a response has been flushed.
/// A close requested while the request was being handled takes effect here.
fn exit_after_response(
    operation: Option<Operation>,
    status: Status,
    handle: &ConnectionHandle,
) -> Option<Exit> {
    // 仅在成功时关闭，失败的登出/注销允许重试
    if operation.is_some_and(Operation::ends_session) && status.is_success() {
        return Some(Exit::SessionEnded);
    }
    if handle.is_closed() {
        return Some(Exit::ForcedClose);
    }
    None
}

fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn open_handle() -> ConnectionHandle {
        let peer = "127.0.0.1:40000".parse().expect("peer addr");
        ConnectionHandle::new(peer, CancellationToken::new())
    }

    #[test]
    fn eviction_during_dispatch_closes_after_the_response() {
        let handle = open_handle();
        assert!(exit_after_response(Some(Operation::ListMovies), Status::OK, &handle).is_none());

        // 处理请求期间被踢下线
        handle.force_close();
        assert!(matches!(
            exit_after_response(Some(Operation::ListMovies), Status::OK, &handle),
            Some(Exit::ForcedClose)
        ));
        assert!(matches!(
            exit_after_response(None, Status::MALFORMED_REQUEST, &handle),
            Some(Exit::ForcedClose)
        ));
    }

    #[rstest]
    #[case(Operation::Logout, Status::OK, true)]
    #[case(Operation::DeleteOwnAccount, Status::OK, true)]
    #[case(Operation::Logout, Status::UNAUTHORIZED, false)]
    #[case(Operation::DeleteOwnAccount, Status::FORBIDDEN, false)]
    #[case(Operation::Login, Status::OK, false)]
    fn only_successful_session_enders_close(
        #[case] operation: Operation,
        #[case] status: Status,
        #[case] closes: bool,
    ) {
        let handle = open_handle();
        let exit = exit_after_response(Some(operation), status, &handle);
        assert_eq!(matches!(exit, Some(Exit::SessionEnded)), closes);
    }

    #[tokio::test]
    async fn forced_close_wakes_an_idle_reader() {
        let handle = Arc::new(open_handle());
        let closer = tokio::spawn({
            let handle = Arc::clone(&handle);
            async move { handle.force_close() }
        });
        tokio::time::timeout(std::time::Duration::from_secs(1), handle.closed())
            .await
            .expect("closed() resolves after force_close");
        closer.await.expect("closer task");
    }
}
