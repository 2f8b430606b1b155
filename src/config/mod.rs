use std::env;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub server_host: String,
    pub server_port: u16,
    pub max_connections: usize,
    pub max_line_bytes: usize,
    pub admin_password: String,
    pub bcrypt_cost: u32,
}

impl Config {
    /// 除密钥外全部使用默认值
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            database_url: "sqlite://voteflix.db?mode=rwc".to_string(),
            jwt_secret: jwt_secret.into(),
            jwt_expiration_secs: 3600,
            server_host: "0.0.0.0".to_string(),
            server_port: 20000,
            max_connections: 64,
            max_line_bytes: 64 * 1024,
            admin_password: "admin".to_string(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|secret| !secret.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let defaults = Self::with_secret(jwt_secret);

        // JWT_EXPIRATION 以小时为单位，例如 "1h" 或 "24"
        let jwt_expiration_hours = match lookup("JWT_EXPIRATION") {
            Some(raw) => raw
                .trim_end_matches('h')
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid {
                    name: "JWT_EXPIRATION",
                    value: raw.clone(),
                })?,
            None => defaults.jwt_expiration_secs / 3600,
        };

        Ok(Config {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            jwt_expiration_secs: jwt_expiration_hours * 3600,
            server_host: lookup("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_var(&lookup, "SERVER_PORT", defaults.server_port)?,
            max_connections: parse_var(&lookup, "MAX_CONNECTIONS", defaults.max_connections)?,
            max_line_bytes: parse_var(&lookup, "MAX_LINE_BYTES", defaults.max_line_bytes)?,
            admin_password: lookup("ADMIN_PASSWORD").unwrap_or(defaults.admin_password),
            bcrypt_cost: parse_var(&lookup, "BCRYPT_COST", defaults.bcrypt_cost)?,
            jwt_secret: defaults.jwt_secret,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        let ip = self.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        });
        SocketAddr::new(ip, self.server_port)
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}
