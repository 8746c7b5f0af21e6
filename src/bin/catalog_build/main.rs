//! Catalog build orchestrator - runs fetch, parse, enrich, write in one pass

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tarifa_backend::ingestion::discovery::DEFAULT_TOP_COLUMNS;
use tarifa_backend::ingestion::enrich::{build_catalog, BuildOptions};
use tarifa_backend::ingestion::fetch::{fetch_sources, latest_update, SourceLocation};
use tarifa_backend::ingestion::parse::{condition_rows, parse_source, price_rows};
use tarifa_backend::ingestion::write::write_catalog;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_target(false)
        .init();

    info!("Starting catalog build");

    let config = BuildConfig::from_env()?;
    info!("Configuration loaded");

    // Step 1: Fetch both sources; either missing aborts the build
    info!("Step 1/5: Fetching sources...");
    let (prices_raw, conditions_raw) =
        fetch_sources(&config.prices, &config.conditions, config.http_timeout)
            .await
            .context("Failed to load source tables")?;
    let source_updated_at = latest_update(&[&prices_raw, &conditions_raw]);
    info!("✓ Fetch complete");

    // Step 2: Parse the semicolon tables
    info!("Step 2/5: Parsing tables...");
    let prices_table = parse_source(prices_raw)?;
    let conditions_table = parse_source(conditions_raw)?;
    info!(
        "✓ Parsed {} price rows, {} condition rows",
        prices_table.rows.len(),
        conditions_table.rows.len()
    );

    // Step 3: Typed rows
    info!("Step 3/5: Extracting typed rows...");
    let prices = price_rows(&prices_table);
    let conditions = condition_rows(&conditions_table);
    info!(
        "✓ {} usable price rows, {} usable condition rows",
        prices.len(),
        conditions.len()
    );

    // Step 4: Join, filter, dedup and attach metadata
    info!("Step 4/5: Building offers...");
    let options = BuildOptions::now(source_updated_at, config.promotion_top_columns);
    let catalog = build_catalog(&prices, &conditions, &options);
    info!("✓ Built {} offers", catalog.offers.len());

    // Step 5: Validate and write the snapshot
    info!("Step 5/5: Writing snapshot...");
    let stats = write_catalog(&config.output_dir, &catalog).await?;
    info!("✓ Write complete: {}", stats);

    info!("Catalog build complete");
    Ok(())
}

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
struct BuildConfig {
    prices: SourceLocation,
    conditions: SourceLocation,
    output_dir: PathBuf,
    promotion_top_columns: usize,
    http_timeout: Duration,
}

impl BuildConfig {
    fn from_env() -> Result<Self> {
        Ok(BuildConfig {
            prices: SourceLocation::parse(
                &env::var("PRICES_SOURCE").unwrap_or_else(|_| "data/Precos_ELEGN.csv".to_string()),
            ),
            conditions: SourceLocation::parse(
                &env::var("CONDITIONS_SOURCE")
                    .unwrap_or_else(|_| "data/CondComerciais.csv".to_string()),
            ),
            output_dir: env::var("OUTPUT_DIR")
                .unwrap_or_else(|_| "data/catalog".to_string())
                .into(),
            promotion_top_columns: env::var("PROMOTION_TOP_COLUMNS")
                .unwrap_or_else(|_| DEFAULT_TOP_COLUMNS.to_string())
                .parse()
                .context("PROMOTION_TOP_COLUMNS must be a valid number")?,
            http_timeout: Duration::from_secs(
                env::var("HTTP_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .context("HTTP_TIMEOUT_SECS must be a valid number")?,
            ),
        })
    }
}
