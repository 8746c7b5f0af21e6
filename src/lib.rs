//! Electricity tariff comparison: catalog pipeline and pricing engine

pub mod api;
pub mod error;
pub mod ingestion;
pub mod pricing;

pub use error::{BuildError, ProfileError, SelectionError, SourceError};
