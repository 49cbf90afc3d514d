use anyhow::Context;
use server::{Server, config::ServerConfig, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env().context("failed to load configuration")?;
    Server::run(config).await?;
    Ok(())
}
