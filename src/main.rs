use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voteflix::{
    AppState,
    admin::{ActiveConnections, AdminControl},
    config::Config,
    database,
    server::{Server, ServerError},
};

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env()?;

    // 设置数据库连接池
    let pool = database::connect(&config).await?;
    database::init(&pool, &config).await?;

    // 设置应用状态
    let state = AppState::new(pool, config.clone());
    let connections = Arc::new(ActiveConnections::new());
    let admin = AdminControl::new(&state, Arc::clone(&connections));

    let server = Server::bind(config.bind_addr(), state, connections).await?;
    let shutdown = server.shutdown_token();

    // Ctrl-C 时停止接受连接并关闭所有客户端
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        tracing::info!(
            connections = admin.active_connections().len(),
            logged_in = admin.logged_in_users().len(),
            "Shutting down"
        );
        shutdown.cancel();
    });

    server.run().await
}
