//! Write functions - validate and persist the catalog snapshot, and load it back

use crate::error::BuildError;
use crate::ingestion::enrich::Catalog;
use crate::ingestion::types::{BuildMetadata, Offer, WriteStats};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

pub const OFFERS_FILE: &str = "offers.json";
pub const METADATA_FILE: &str = "metadata.json";

/// Check build invariants before anything touches disk
pub fn validate_catalog(catalog: &Catalog) -> Result<(), BuildError> {
    let applied = catalog.metadata.build.statistics.promotions_applied_count;
    if applied != 0 {
        return Err(BuildError::PromotionsApplied { count: applied });
    }
    if catalog.offers.is_empty() {
        return Err(BuildError::EmptyCatalog);
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Validate, then write both files next to each other via temp + rename so
/// readers never see a partial snapshot
pub async fn write_catalog(dir: &Path, catalog: &Catalog) -> Result<WriteStats> {
    validate_catalog(catalog)?;

    info!("Writing {} offers to {:?}", catalog.offers.len(), dir);
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create output directory {:?}", dir))?;

    let offers_json = serde_json::to_vec_pretty(&catalog.offers)?;
    let metadata_json = serde_json::to_vec_pretty(&catalog.metadata)?;

    let targets = [
        (dir.join(OFFERS_FILE), &offers_json),
        (dir.join(METADATA_FILE), &metadata_json),
    ];

    for (path, bytes) in &targets {
        fs::write(temp_path(path), bytes)
            .await
            .with_context(|| format!("Failed to write {:?}", temp_path(path)))?;
    }
    for (path, _) in &targets {
        fs::rename(temp_path(path), path)
            .await
            .with_context(|| format!("Failed to move snapshot into place at {:?}", path))?;
    }

    let stats = WriteStats {
        offers_written: catalog.offers.len(),
        bytes_written: offers_json.len() + metadata_json.len(),
    };
    info!("Write complete: {}", stats);
    Ok(stats)
}

/// Snapshot as read back by the API server
#[derive(Debug, Clone)]
pub struct LoadedCatalog {
    pub offers: Vec<Offer>,
    pub metadata: Option<BuildMetadata>,
}

/// Load a snapshot directory. The offer list is required; the metadata
/// document is optional and only logged when missing.
pub async fn load_catalog(dir: &Path) -> Result<LoadedCatalog> {
    let offers_path = dir.join(OFFERS_FILE);
    let raw = fs::read(&offers_path)
        .await
        .with_context(|| format!("Failed to read {:?}", offers_path))?;
    let offers: Vec<Offer> = serde_json::from_slice(&raw)
        .with_context(|| format!("Failed to parse {:?}", offers_path))?;

    let metadata_path = dir.join(METADATA_FILE);
    let metadata = match fs::read(&metadata_path).await {
        Ok(raw) => Some(
            serde_json::from_slice(&raw)
                .with_context(|| format!("Failed to parse {:?}", metadata_path))?,
        ),
        Err(e) => {
            warn!("No build metadata at {:?}: {}", metadata_path, e);
            None
        }
    };

    info!("Loaded {} offers from {:?}", offers.len(), dir);
    Ok(LoadedCatalog { offers, metadata })
}
