// 数据库模块
// 负责连接池、表结构初始化与管理员账户

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::config::Config;
use crate::error::AppError;
use crate::utils::hash_password;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'user'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS movies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        titulo TEXT NOT NULL,
        diretor TEXT NOT NULL,
        ano TEXT NOT NULL,
        generos TEXT NOT NULL,
        sinopse TEXT NOT NULL DEFAULT '',
        nota REAL NOT NULL DEFAULT 0,
        qtd_avaliacoes INTEGER NOT NULL DEFAULT 0,
        UNIQUE (titulo, diretor, ano)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reviews (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        id_filme INTEGER NOT NULL REFERENCES movies(id) ON DELETE CASCADE,
        id_usuario INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        nota INTEGER NOT NULL,
        titulo TEXT NOT NULL,
        descricao TEXT NOT NULL DEFAULT '',
        data TEXT NOT NULL,
        editado INTEGER NOT NULL DEFAULT 0,
        UNIQUE (id_filme, id_usuario)
    )
    "#,
];

pub async fn connect(config: &Config) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// 单连接的内存数据库，连接不回收以免丢失数据
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

pub async fn init(pool: &SqlitePool, config: &Config) -> Result<(), AppError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    // 确保管理员账户存在
    let admin_hash = hash_password(&config.admin_password, config.bcrypt_cost)?;
    let seeded = sqlx::query(
        "INSERT OR IGNORE INTO users (username, password_hash, role) VALUES ('admin', ?, 'admin')",
    )
    .bind(admin_hash)
    .execute(pool)
    .await?;
    if seeded.rows_affected() > 0 {
        tracing::info!("Created default admin account");
    }

    Ok(())
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
