use config::Config;
use server::SessionRegistry;
use sqlx::SqlitePool;
use std::sync::Arc;
use utils::TokenService;

pub mod admin;
pub mod common;
pub mod config;
pub mod database;
pub mod error;
pub mod middleware;
pub mod result;
pub mod router;
pub mod server;
pub mod utils;
pub mod validation;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub tokens: Arc<TokenService>,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        let tokens = Arc::new(TokenService::from_config(&config));
        Self {
            pool,
            config,
            tokens,
            sessions: SessionRegistry::new(),
        }
    }
}
