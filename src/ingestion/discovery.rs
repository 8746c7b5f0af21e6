//! Discovery pass - rank condition columns by promotional keyword density
//!
//! The upstream column layout is not stable between data pulls, so the columns
//! that carry promotional text are found from the data instead of being
//! hard-coded. The top-ranked columns feed promotion extraction for the batch.

use crate::ingestion::types::{columns, Cell, ConditionRow, FieldHits};
use crate::ingestion::utils::{fold_text, truncate_chars};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// Keywords counted per column, already case- and diacritic-folded
pub const PROMOTION_LEXICON: &[&str] = &[
    "desconto",
    "€",
    "euro",
    "por mes",
    "/mes",
    "mensal",
    "campanha",
    "promo",
    "oferta",
    "voucher",
    "cashback",
    "reembolso",
    "gratis",
    "poupanca",
];

pub const DEFAULT_TOP_COLUMNS: usize = 5;
pub const SNIPPETS_PER_COLUMN: usize = 3;
pub const SNIPPET_MAX_CHARS: usize = 160;

/// Structural columns never considered promotional text
const EXCLUDED_COLUMNS: &[&str] = &[
    columns::PROVIDER,
    columns::PROPOSAL,
    columns::SUPPLY,
    columns::SEGMENT,
    columns::VALID_FROM,
    columns::VALID_TO,
    "LinkOfertaCom",
    "LinkCOM",
    "LinkFichaPadrao",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discovery {
    /// Every column with at least one hit, best first
    pub ranked: Vec<FieldHits>,
    /// Column names fed to promotion extraction
    pub top_columns: Vec<String>,
    pub snippets: BTreeMap<String, Vec<String>>,
}

pub fn count_hits(text: &str) -> usize {
    let folded = fold_text(text);
    PROMOTION_LEXICON
        .iter()
        .map(|k| folded.matches(k).count())
        .sum()
}

/// Rank string columns by total lexicon hits (descending, ties by name) and
/// keep the top `top_n` as the prioritized promotion columns
pub fn discover_promotion_columns(rows: &[ConditionRow], top_n: usize) -> Discovery {
    let names: BTreeSet<&str> = rows
        .iter()
        .flat_map(|r| r.raw.keys().map(String::as_str))
        .filter(|name| !EXCLUDED_COLUMNS.contains(name))
        .collect();

    let mut hits: HashMap<&str, usize> = HashMap::new();
    for row in rows {
        for name in &names {
            if let Some(text) = row.raw.get(*name).and_then(Cell::as_text) {
                let n = count_hits(text);
                if n > 0 {
                    *hits.entry(*name).or_insert(0) += n;
                }
            }
        }
    }

    let mut ranked: Vec<FieldHits> = hits
        .into_iter()
        .map(|(field, hits)| FieldHits {
            field: field.to_string(),
            hits,
        })
        .collect();
    ranked.sort_by(|a, b| b.hits.cmp(&a.hits).then_with(|| a.field.cmp(&b.field)));

    let top_columns: Vec<String> = ranked.iter().take(top_n).map(|f| f.field.clone()).collect();

    let mut snippets: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for column in &top_columns {
        let samples = snippets.entry(column.clone()).or_default();
        for row in rows {
            if samples.len() >= SNIPPETS_PER_COLUMN {
                break;
            }
            if let Some(text) = row.raw.get(column.as_str()).and_then(Cell::as_text) {
                let snippet = truncate_chars(text, SNIPPET_MAX_CHARS);
                if count_hits(text) > 0 && !samples.contains(&snippet) {
                    samples.push(snippet);
                }
            }
        }
    }

    for field in &ranked {
        debug!("Promotion column {}: {} hits", field.field, field.hits);
    }
    info!(
        "Discovery ranked {} columns; using {:?}",
        ranked.len(),
        top_columns
    );

    Discovery {
        ranked,
        top_columns,
        snippets,
    }
}
