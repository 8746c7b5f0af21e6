//! Fetch functions - load the two source tables from disk, HTTP or a ZIP bundle

use crate::error::SourceError;
use crate::ingestion::types::{RawData, RawSource};
use crate::ingestion::utils::{http_get, read_zip_entry};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;

/// Where a source table lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    File(PathBuf),
    Url(String),
    /// `archive.zip#entry.csv`
    ZipEntry { archive: PathBuf, entry: String },
}

impl SourceLocation {
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        if location.starts_with("http://") || location.starts_with("https://") {
            return SourceLocation::Url(location.to_string());
        }
        if let Some((archive, entry)) = location.split_once('#') {
            if archive.to_ascii_lowercase().ends_with(".zip") && !entry.is_empty() {
                return SourceLocation::ZipEntry {
                    archive: PathBuf::from(archive),
                    entry: entry.to_string(),
                };
            }
        }
        SourceLocation::File(PathBuf::from(location))
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceLocation::File(path) => write!(f, "{}", path.display()),
            SourceLocation::Url(url) => write!(f, "{}", url),
            SourceLocation::ZipEntry { archive, entry } => {
                write!(f, "{}#{}", archive.display(), entry)
            }
        }
    }
}

async fn read_file(path: &Path) -> Result<(Vec<u8>, Option<DateTime<Utc>>), SourceError> {
    let bytes = fs::read(path).await.map_err(|source| match source.kind() {
        ErrorKind::NotFound => SourceError::Missing(path.to_path_buf()),
        _ => SourceError::Io {
            origin: path.display().to_string(),
            source,
        },
    })?;
    let modified = fs::metadata(path)
        .await
        .ok()
        .and_then(|m| m.modified().ok())
        .map(DateTime::<Utc>::from);
    Ok((bytes, modified))
}

/// Fetch one source table. An empty payload is a fatal error.
pub async fn fetch_source(
    label: &str,
    location: &SourceLocation,
    timeout: Duration,
) -> Result<RawSource, SourceError> {
    info!("Fetching {} from {}", label, location);

    let (data, updated_at) = match location {
        SourceLocation::File(path) => {
            let (bytes, modified) = read_file(path).await?;
            (RawData(bytes.into()), modified)
        }
        SourceLocation::Url(url) => (RawData(http_get(url, timeout).await?), None),
        SourceLocation::ZipEntry { archive, entry } => {
            let (bytes, modified) = read_file(archive).await?;
            let archive_name = archive.display().to_string();
            let entry_bytes = read_zip_entry(&bytes, &archive_name, entry)?;
            (RawData(entry_bytes), modified)
        }
    };

    if data.is_empty() {
        return Err(SourceError::Empty(location.to_string()));
    }

    Ok(RawSource {
        label: label.to_string(),
        origin: location.to_string(),
        data,
        updated_at,
    })
}

/// Load both tables concurrently. Either one failing fails the whole load;
/// there is no partial mode.
pub async fn fetch_sources(
    prices: &SourceLocation,
    conditions: &SourceLocation,
    timeout: Duration,
) -> Result<(RawSource, RawSource), SourceError> {
    tokio::try_join!(
        fetch_source("prices", prices, timeout),
        fetch_source("conditions", conditions, timeout),
    )
}

/// Most recent modification time across the loaded sources
pub fn latest_update(sources: &[&RawSource]) -> Option<DateTime<Utc>> {
    sources.iter().filter_map(|s| s.updated_at).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_parse_location() {
        assert_eq!(
            SourceLocation::parse("https://example.pt/precos.csv"),
            SourceLocation::Url("https://example.pt/precos.csv".to_string())
        );
        assert_eq!(
            SourceLocation::parse("data/bundle.zip#CondComerciais.csv"),
            SourceLocation::ZipEntry {
                archive: PathBuf::from("data/bundle.zip"),
                entry: "CondComerciais.csv".to_string(),
            }
        );
        assert_eq!(
            SourceLocation::parse("data/precos.csv"),
            SourceLocation::File(PathBuf::from("data/precos.csv"))
        );
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let temp = tempdir().unwrap();
        let location = SourceLocation::File(temp.path().join("nope.csv"));

        let result = fetch_source("prices", &location, TIMEOUT).await;
        assert!(matches!(result, Err(SourceError::Missing(_))));
    }

    #[tokio::test]
    async fn test_fetch_empty_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("empty.csv");
        std::fs::write(&path, "\n  \n").unwrap();

        let result = fetch_source("prices", &SourceLocation::File(path), TIMEOUT).await;
        assert!(matches!(result, Err(SourceError::Empty(_))));
    }

    #[tokio::test]
    async fn test_fetch_sources_requires_both() {
        let temp = tempdir().unwrap();
        let prices = temp.path().join("precos.csv");
        std::fs::write(&prices, "COM;TF\nEDP;0,2\n").unwrap();

        let result = fetch_sources(
            &SourceLocation::File(prices),
            &SourceLocation::File(temp.path().join("missing.csv")),
            TIMEOUT,
        )
        .await;
        assert!(matches!(result, Err(SourceError::Missing(_))));
    }

    #[tokio::test]
    async fn test_fetch_zip_entries() {
        let temp = tempdir().unwrap();
        let archive = temp.path().join("bundle.zip");
        let file = std::fs::File::create(&archive).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        writer.start_file("Precos_ELEGN.csv", options).unwrap();
        writer.write_all(b"COM;TF\nEDP;0,2\n").unwrap();
        writer.start_file("CondComerciais.csv", options).unwrap();
        writer.write_all(b"COM;Fornecimento\nEDP;ELE\n").unwrap();
        writer.finish().unwrap();

        let prefix = format!("{}#", archive.display());
        let (prices, conditions) = fetch_sources(
            &SourceLocation::parse(&format!("{}Precos_ELEGN.csv", prefix)),
            &SourceLocation::parse(&format!("{}CondComerciais.csv", prefix)),
            TIMEOUT,
        )
        .await
        .unwrap();

        assert_eq!(prices.label, "prices");
        assert!(prices.updated_at.is_some());
        assert_eq!(conditions.data.into_text(), "COM;Fornecimento\nEDP;ELE\n");
    }

    #[tokio::test]
    #[ignore] // Hits the network
    async fn test_fetch_url() {
        let location = SourceLocation::parse("https://www.erse.pt/");
        assert!(fetch_source("prices", &location, TIMEOUT).await.is_ok());
    }
}
