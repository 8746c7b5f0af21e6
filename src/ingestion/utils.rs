//! Utility functions for common operations

use crate::error::SourceError;
use bytes::Bytes;
use reqwest::Client;
use std::io::{Cursor, Read};
use std::time::Duration;
use tracing::info;

/// Download a source via HTTP
pub async fn http_get(url: &str, timeout: Duration) -> Result<Bytes, SourceError> {
    info!("Downloading from {}", url);
    let http_err = |reason: String| SourceError::Http {
        url: url.to_string(),
        reason,
    };

    let client = Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| http_err(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| http_err(e.to_string()))?;
    let status = response.status();

    if !status.is_success() {
        return Err(http_err(format!("HTTP request failed: {}", status)));
    }

    let bytes = response.bytes().await.map_err(|e| http_err(e.to_string()))?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes)
}

/// Read one named entry out of a ZIP archive held in memory.
/// Matches the full entry path first, then the file name alone.
pub fn read_zip_entry(archive_bytes: &[u8], archive: &str, entry: &str) -> Result<Bytes, SourceError> {
    let zip_err = |source| SourceError::Zip {
        archive: archive.to_string(),
        source,
    };
    let mut zip = zip::ZipArchive::new(Cursor::new(archive_bytes)).map_err(zip_err)?;

    for i in 0..zip.len() {
        let mut file = zip.by_index(i).map_err(zip_err)?;
        let name = file.name().to_string();
        let file_name = name.rsplit('/').next().unwrap_or(&name);

        if name == entry || file_name == entry {
            info!("Found {} in {}", name, archive);
            let mut buf = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut buf).map_err(|source| SourceError::Io {
                origin: format!("{}#{}", archive, entry),
                source,
            })?;
            return Ok(Bytes::from(buf));
        }
    }

    Err(SourceError::EntryNotFound {
        archive: archive.to_string(),
        entry: entry.to_string(),
    })
}

/// Decode source bytes as UTF-8, falling back to Latin-1
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Parse a decimal written with either comma or dot as separator
pub fn parse_decimal(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

/// Lowercase and strip Portuguese diacritics for keyword matching
pub fn fold_text(value: &str) -> String {
    value
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

/// Yes/no flags come as "S", "Sim", "Y", "true", "1" and friends
pub fn parse_flag(value: &str) -> Option<bool> {
    match fold_text(value.trim()).as_str() {
        "s" | "sim" | "y" | "yes" | "true" | "1" => Some(true),
        "n" | "nao" | "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Truncate to at most `max` characters, marking the cut with "..."
pub fn truncate_chars(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = value.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Median of a slice; `None` when empty
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
