use std::sync::Arc;

use sqlx::PgPool;

use crate::{auth::JwtService, config::ServerConfig};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: ServerConfig,
    pub jwt: Arc<JwtService>,
}

impl AppState {
    pub fn new(pool: PgPool, config: ServerConfig) -> Self {
        let jwt = Arc::new(JwtService::new(config.jwt_secret.clone()));
        Self { pool, config, jwt }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn jwt(&self) -> Arc<JwtService> {
        Arc::clone(&self.jwt)
    }
}
