//! Error types shared by the pipeline and the pricing engine

use crate::ingestion::types::TariffStructure;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal source-availability errors. Any of these aborts a catalog build.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source file not found: {0}")]
    Missing(PathBuf),

    #[error("source is empty: {0}")]
    Empty(String),

    #[error("source has a header but no data rows: {0}")]
    NoDataRows(String),

    #[error("unreadable header in {origin}: {reason}")]
    Header { origin: String, reason: String },

    #[error("io error reading {origin}: {source}")]
    Io {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http error fetching {url}: {reason}")]
    Http { url: String, reason: String },

    #[error("zip error in {archive}: {source}")]
    Zip {
        archive: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("entry {entry} not found in {archive}")]
    EntryNotFound { archive: String, entry: String },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Offer Selector failures. Each variant carries the filter that failed so the
/// caller can explain which power/tariff combination had no candidates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectionError {
    #[error("no valid offer for {power_kva} kVA / tariff {tariff}")]
    NoValidOffer {
        power_kva: f64,
        tariff: TariffStructure,
    },

    #[error("no offer with valid cost for {power_kva} kVA / tariff {tariff}")]
    NoOfferWithValidCost {
        power_kva: f64,
        tariff: TariffStructure,
    },

    #[error("computed monthly cost {cost:.2} is below the plausible minimum")]
    ImplausibleCost { cost: f64 },
}

/// Build-validation failures raised before a snapshot is written
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("promotions applied to {count} offers; promotions must stay metadata-only")]
    PromotionsApplied { count: usize },

    #[error("catalog is empty; refusing to write snapshot")]
    EmptyCatalog,
}

/// Consumption profiles that cannot be turned into a kWh/kVA pair
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("invalid consumption: {0} kWh")]
    InvalidConsumption(f64),

    #[error("invalid contracted power: {0} kVA")]
    InvalidPower(f64),

    #[error("invalid bill amount: {0}")]
    InvalidBill(f64),

    #[error("invoice extract has no consumption")]
    MissingConsumption,
}
