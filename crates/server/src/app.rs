use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::{AppState, config::ServerConfig, db, routes};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct Server;

impl Server {
    /// Connects, migrates and serves until ctrl-c.
    pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
        let pool = db::create_pool(&config.database_url).await?;
        db::migrate(&pool).await?;
        info!(
            max_connections = db::get_max_connections(),
            "database ready"
        );

        let listen_addr = config.listen_addr;
        let state = AppState::new(pool, config);
        let router = routes::router(state);

        let listener = TcpListener::bind(listen_addr).await?;
        info!(%listen_addr, "taskdesk server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(?error, "failed to install ctrl-c handler");
    }
}
