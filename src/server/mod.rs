//! TCP transport: accept loop, per-connection workers and the session
//! registry shared between them.

mod connection;
mod errors;
mod listener;
mod registry;

pub use self::connection::serve_connection;
pub use self::errors::ServerError;
pub use self::listener::Server;
pub use self::registry::{ConnectionHandle, ConnectionId, SessionRegistry};

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");
