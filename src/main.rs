use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use tarifa_backend::api::{router, AppState};
use tarifa_backend::ingestion::write::load_catalog;
use tarifa_backend::pricing::PricingConfig;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
struct ServerConfig {
    catalog_dir: PathBuf,
    bind_addr: SocketAddr,
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        Ok(ServerConfig {
            catalog_dir: env::var("CATALOG_DIR")
                .unwrap_or_else(|_| "data/catalog".to_string())
                .into(),
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3001".to_string())
                .parse()
                .context("BIND_ADDR must be a socket address")?,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("⚡ Starting tariff API server...");

    let config = ServerConfig::from_env()?;
    let pricing = PricingConfig::from_env()?;

    info!("📦 Loading catalog from {:?}", config.catalog_dir);
    let catalog = load_catalog(&config.catalog_dir)
        .await
        .context("No catalog snapshot; run catalog-build first")?;
    info!("✅ Catalog loaded: {} offers", catalog.offers.len());

    let app = router(AppState::new(catalog, pricing));

    info!("🚀 Server running on http://{}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
