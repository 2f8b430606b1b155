//! Errors surfaced while starting or running the server.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ConfigError;
use crate::error::AppError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to open database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to initialise database: {0}")]
    Init(#[from] AppError),
    #[error("failed to bind TCP listener at {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to read listener address: {0}")]
    LocalAddr(#[source] io::Error),
    #[error("connection pool closed")]
    PoolClosed,
}
