//! Catalog pipeline - fetch, parse, enrich and write the offer snapshot

pub mod discovery;
pub mod enrich;
pub mod fetch;
pub mod metadata;
pub mod parse;
pub mod types;
pub mod utils;
pub mod write;

pub use types::*;
