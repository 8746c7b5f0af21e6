//! Core data types for the catalog pipeline
//! Pure data structures with no behavior beyond small accessors

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::ingestion::utils::{decode_text, parse_decimal};

/// Column names used by the regulator's two tables.
///
/// Header names are opaque keys and are matched verbatim. Where a concept has
/// moved between columns across data pulls, the candidates are listed in
/// priority order and the first non-empty value wins.
pub mod columns {
    pub const PROVIDER: &str = "COM";
    pub const PROPOSAL: &str = "COD_Proposta";

    // Pricing table
    pub const POWER: &str = "Pot_Cont";
    pub const TARIFF: &str = "Contagem";
    pub const FIXED_DAILY: &str = "TF";
    pub const ENERGY_PRIMARY: &str = "TV|TVFV|TVP";
    pub const ENERGY_SECONDARY: &str = "TVV|TVC";
    pub const ENERGY_OFF_PEAK: &str = "TVVz";

    // Commercial-conditions table
    pub const SUPPLY: &str = "Fornecimento";
    pub const SEGMENT: &str = "Segmento";
    pub const NAME: &str = "NomeProposta";
    pub const PHONE: &[&str] = &["TelefoneComercial", "Contacto", "Telefone"];
    pub const WEBSITE: &[&str] = &["LinkOfertaCom", "LinkCOM"];
    pub const VALID_FROM: &str = "Data ini";
    pub const VALID_TO: &str = "Data fim";
    pub const CAMPAIGN_FROM: &[&str] = &["Data ini campanha", "DataIniCampanha"];
    pub const CAMPAIGN_TO: &[&str] = &["Data fim campanha", "DataFimCampanha"];
    pub const LOCK_IN_FLAG: &[&str] = &["Fidelização", "Fidelizacao"];
    pub const LOCK_IN_DURATION: &[&str] = &["PrazoFidelização", "PrazoFidelizacao"];
    pub const LOCK_IN_TEXT: &[&str] = &[
        "DescFidelização",
        "CustosFidelização",
        "CondiçõesFidelização",
    ];
    pub const INDEXED: &[&str] = &["Indexada", "PrecoIndexado"];
    pub const NEW_CUSTOMERS: &[&str] = &["NovosClientes", "ApenasNovosClientes"];
    pub const DIRECT_DEBIT: &[&str] = &["DébitoDireto", "DebitoDireto"];
    pub const E_BILL: &[&str] = &["FaturaEletrónica", "FaturaEletronica"];

    /// Free-text columns searched for promotions when discovery ranked none
    pub const PROMOTION_FALLBACK: &[&str] = &[
        "Descrição",
        "Desconto",
        "Campanha",
        "Observações",
        "OutrasCondições",
    ];

    /// Sentinel value of [`SUPPLY`] for electricity-only offers
    pub const ELECTRICITY: &str = "ELE";
}

/// Contracted power values (kVA) offered to residential customers
pub const STANDARD_POWERS_KVA: [f64; 10] = [
    1.15, 2.3, 3.45, 4.6, 5.75, 6.9, 10.35, 13.8, 17.25, 20.7,
];

/// Tolerance used when comparing contracted power values
pub const POWER_TOLERANCE: f64 = 1e-6;

pub fn is_standard_power(power_kva: f64) -> bool {
    STANDARD_POWERS_KVA
        .iter()
        .any(|p| (p - power_kva).abs() < POWER_TOLERANCE)
}

/// Raw source payload as it comes off disk or the wire
#[derive(Debug, Clone)]
pub struct RawData(pub Bytes);

impl RawData {
    /// Decode the payload, falling back to Latin-1 for non-UTF-8 bytes
    pub fn into_text(self) -> String {
        decode_text(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| b.is_ascii_whitespace())
    }
}

/// One loaded source table plus provenance
#[derive(Debug, Clone)]
pub struct RawSource {
    pub label: String,
    pub origin: String,
    pub data: RawData,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A single parsed field. Empty fields stay as empty text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
}

impl Cell {
    /// Non-empty text content, if this is a text cell
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the cell; text is parsed with comma-or-dot decimals
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) if n.is_finite() => Some(*n),
            Cell::Number(_) => None,
            Cell::Text(s) => parse_decimal(s),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Cell::Text(s) if s.is_empty())
    }

    /// Stable string form used for join keys and display
    pub fn to_key(&self) -> String {
        match self {
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
            Cell::Text(s) => s.clone(),
        }
    }
}

pub type Row = HashMap<String, Cell>;

/// Parsed table: header order plus rows keyed by header name
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

/// First non-blank value among candidate columns, as text
pub fn first_value(row: &Row, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .filter_map(|c| row.get(*c))
        .find(|cell| !cell.is_blank())
        .map(Cell::to_key)
}

/// Time-of-use pricing scheme, serialized as the regulator's numeric code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum TariffStructure {
    Simple,
    BiHourly,
    TriHourly,
    Other(u8),
}

impl From<u8> for TariffStructure {
    fn from(code: u8) -> Self {
        match code {
            1 => TariffStructure::Simple,
            2 => TariffStructure::BiHourly,
            3 => TariffStructure::TriHourly,
            other => TariffStructure::Other(other),
        }
    }
}

impl From<TariffStructure> for u8 {
    fn from(tariff: TariffStructure) -> Self {
        match tariff {
            TariffStructure::Simple => 1,
            TariffStructure::BiHourly => 2,
            TariffStructure::TriHourly => 3,
            TariffStructure::Other(code) => code,
        }
    }
}

impl std::fmt::Display for TariffStructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TariffStructure::Simple => write!(f, "simple"),
            TariffStructure::BiHourly => write!(f, "bi-hourly"),
            TariffStructure::TriHourly => write!(f, "tri-hourly"),
            TariffStructure::Other(code) => write!(f, "code {}", code),
        }
    }
}

/// Row from the pricing table, numeric fields already normalized
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    pub provider: String,
    pub proposal: String,
    pub power_kva: f64,
    pub tariff: TariffStructure,
    pub fixed_daily: f64,
    pub energy_primary: f64,
    pub energy_secondary: Option<f64>,
    pub energy_off_peak: Option<f64>,
}

/// Row from the commercial-conditions table.
/// `raw` keeps every column for column-driven extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionRow {
    pub provider: String,
    pub proposal: String,
    pub supply: String,
    pub segment: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub valid_from: Option<String>,
    pub valid_to: Option<String>,
    pub lock_in_flag: Option<String>,
    pub lock_in_duration: Option<f64>,
    pub lock_in_texts: Vec<String>,
    pub raw: Row,
}

impl ConditionRow {
    pub fn is_electricity(&self) -> bool {
        self.supply.trim().eq_ignore_ascii_case(columns::ELECTRICITY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleType {
    Daily,
    Weekly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockInSource {
    Field,
    Text,
}

/// Fixed monthly discount found in free text. Metadata only: never priced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    pub fixed_euro_month: f64,
    pub duration_months_extracted: Option<u32>,
    pub duration_months_applied: u32,
    pub duration_assumed: bool,
    pub is_active: Option<bool>,
}

/// Energy rates resolved by tariff structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rates {
    Simple { energy: f64 },
    BiHourly { peak: f64, off_peak: f64 },
    TriHourly { peak: f64, mid: f64, off_peak: f64 },
}

/// One (provider, proposal, power, tariff structure) combination with all
/// derived metadata. Field names follow the snapshot format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    #[serde(rename = "COM")]
    pub provider: String,
    #[serde(rename = "COD_Proposta")]
    pub proposal: String,
    #[serde(rename = "Pot_Cont")]
    pub power_kva: f64,
    #[serde(rename = "Contagem")]
    pub tariff: TariffStructure,
    #[serde(rename = "TF")]
    pub fixed_daily: f64,
    #[serde(rename = "TV|TVFV|TVP")]
    pub energy_primary: f64,
    #[serde(rename = "TVV|TVC")]
    pub energy_secondary: Option<f64>,
    #[serde(rename = "TVVz")]
    pub energy_off_peak: Option<f64>,
    pub tariff_name: Option<String>,
    pub cycle_type: Option<CycleType>,
    pub website: Option<String>,
    pub phone: Option<String>,
    #[serde(rename = "fornecimento")]
    pub supply: String,
    #[serde(rename = "segmento")]
    pub segment: Option<String>,
    pub valid_from: Option<String>,
    pub valid_to: Option<String>,
    pub is_indexed: bool,
    pub has_lock_in: bool,
    pub lock_in_months: Option<u32>,
    pub lock_in_source: Option<LockInSource>,
    pub promotion: Option<Promotion>,
    pub new_customer_only: bool,
    pub requires_direct_debit: bool,
    pub requires_e_bill: bool,
    pub campaign_summary: Option<String>,
    pub is_offer_active: Option<bool>,
    pub is_campaign_active: Option<bool>,
    pub is_promotion_active: Option<bool>,
}

impl Offer {
    /// Resolve energy rates for this offer's tariff structure.
    /// Missing secondary rates fall back to the primary rate so a malformed
    /// snapshot row can never price below its headline rate.
    pub fn rates(&self) -> Rates {
        let secondary = self
            .energy_secondary
            .filter(|r| *r > 0.0)
            .unwrap_or(self.energy_primary);
        match self.tariff {
            TariffStructure::BiHourly => Rates::BiHourly {
                peak: self.energy_primary,
                off_peak: secondary,
            },
            TariffStructure::TriHourly => Rates::TriHourly {
                peak: self.energy_primary,
                mid: secondary,
                off_peak: self
                    .energy_off_peak
                    .filter(|r| *r > 0.0)
                    .unwrap_or(secondary),
            },
            TariffStructure::Simple | TariffStructure::Other(_) => Rates::Simple {
                energy: self.energy_primary,
            },
        }
    }

    /// Name used for display and deterministic tie-breaks
    pub fn display_name(&self) -> &str {
        self.tariff_name.as_deref().unwrap_or(&self.provider)
    }

    pub fn is_priceable(&self) -> bool {
        self.fixed_daily > 0.0 && self.energy_primary > 0.0
    }

    pub fn matches_power(&self, power_kva: f64) -> bool {
        (self.power_kva - power_kva).abs() < POWER_TOLERANCE
    }
}

/// Lock-in counts split by detection source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockInTotals {
    pub field: usize,
    pub text: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowCounts {
    pub price_rows: usize,
    pub condition_rows: usize,
    pub skipped_missing_condition: usize,
    pub skipped_not_electricity: usize,
    pub skipped_unpriceable: usize,
    pub skipped_duplicate: usize,
    pub offers: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatistics {
    pub lock_in_count: usize,
    pub lock_in_by_source_totals: LockInTotals,
    pub active_offers_count: usize,
    pub promotions_with_metadata_count: usize,
    pub promotions_with_known_active_status_count: usize,
    pub promotions_active_count: usize,
    /// Always zero: promotions are metadata and never priced
    pub promotions_applied_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSummary {
    pub built_at: DateTime<Utc>,
    pub source_updated_at: Option<DateTime<Utc>>,
    pub offers_count: usize,
    pub row_counts: RowCounts,
    pub filters_applied: Vec<String>,
    pub statistics: BuildStatistics,
}

/// Keyword hits for one conditions column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldHits {
    pub field: String,
    pub hits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInSample {
    pub provider: String,
    pub proposal: String,
    pub months: Option<u32>,
    pub source: LockInSource,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionSample {
    pub provider: String,
    pub proposal: String,
    pub promotion: Promotion,
    pub snippet: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    pub promotion_field_hits: Vec<FieldHits>,
    pub sample_promotion_snippets: BTreeMap<String, Vec<String>>,
    pub lock_in_samples: Vec<LockInSample>,
    pub lock_in_by_source: LockInTotals,
    pub promotion_parsed_samples: Vec<PromotionSample>,
}

/// Side artifact written next to the offer list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildMetadata {
    pub build: BuildSummary,
    pub discovery: DiscoveryReport,
}

/// Snapshot write statistics
#[derive(Debug, Default, Clone)]
pub struct WriteStats {
    pub offers_written: usize,
    pub bytes_written: usize,
}

impl std::fmt::Display for WriteStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "offers: {}, bytes: {}",
            self.offers_written, self.bytes_written
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tariff_structure_codes() {
        assert_eq!(TariffStructure::from(1), TariffStructure::Simple);
        assert_eq!(TariffStructure::from(3), TariffStructure::TriHourly);
        assert_eq!(TariffStructure::from(7), TariffStructure::Other(7));
        assert_eq!(u8::from(TariffStructure::BiHourly), 2);
    }

    #[test]
    fn test_cell_key_formatting() {
        assert_eq!(Cell::Number(12.0).to_key(), "12");
        assert_eq!(Cell::Number(6.9).to_key(), "6.9");
        assert_eq!(Cell::Text("ABC".into()).to_key(), "ABC");
    }

    #[test]
    fn test_raw_data_text() {
        let latin1 = RawData(Bytes::from_static(&[b'F', b'i', b'd', 0xE9]));
        assert_eq!(latin1.into_text(), "Fidé");
        assert!(RawData(Bytes::from_static(b" \r\n")).is_empty());
        assert!(!RawData(Bytes::from_static(b"COM")).is_empty());
    }

    #[test]
    fn test_standard_power() {
        assert!(is_standard_power(6.9));
        assert!(is_standard_power(10.35));
        assert!(!is_standard_power(99.0));
    }
}
