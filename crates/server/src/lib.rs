mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod policy;
pub mod routes;
mod state;

pub use app::{Server, ServerError};
pub use state::AppState;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "info,server=debug";

/// Installs the global subscriber; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .with(ErrorLayer::default())
        .try_init();
}
