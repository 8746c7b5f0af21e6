//! Metadata extraction - derive lock-in, promotion, activity and display
//! fields from one commercial-conditions row. Pure functions, no I/O.

use crate::ingestion::types::{
    columns, first_value, Cell, ConditionRow, CycleType, LockInSource, Promotion,
};
use crate::ingestion::utils::{fold_text, parse_decimal, parse_flag, truncate_chars};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

pub const CAMPAIGN_SUMMARY_MAX_CHARS: usize = 200;
pub const EVIDENCE_MAX_CHARS: usize = 160;

/// Upper bound for a believable recurring monthly discount, in euros
pub const MAX_MONTHLY_DISCOUNT: f64 = 100.0;

/// Applied duration when a discount has no stated duration.
/// Kept for output compatibility; this is a policy choice, not a derived value.
pub const ASSUMED_PROMOTION_MONTHS: u32 = 12;

const AMOUNT: &str = r"\b(\d{1,3}(?:[.,]\d{1,2})?)";
const CURRENCY: &str = r"(?:€|\beuros?\b|\beur\b)";
const MONTHLY: &str = r"(?:/\s*mes\b|\bpor\s+(?:cada\s+)?mes\b|\bmensa(?:l|is)\b|\bao\s+mes\b|\btodos\s+os\s+meses\b|\bem\s+cada\s+mes\b)";
const BILL: &str = r"(?:\b(?:na|nas|por|em\s+cada|em\s+todas\s+as)\s+faturas?\b)";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

/// Discount patterns in priority order. Every pattern anchors the amount to a
/// monthly or per-bill token so one-off vouchers never match.
static PROMOTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    let context = format!("(?:{MONTHLY}|{BILL})");
    vec![
        // "5€/mês", "2,5 euros de desconto na fatura"
        compile(&format!(
            r"{AMOUNT}\s*{CURRENCY}\s*(?:de\s+desconto\s*)?{context}"
        )),
        // "desconto mensal de 5€"
        compile(&format!(r"\bdesconto\s+mensal\s+de\s+{AMOUNT}\s*{CURRENCY}")),
        // "€5 por mês"
        compile(&format!(r"{CURRENCY}\s*{AMOUNT}\s*{context}")),
        // "todos os meses, um desconto de 3€"
        compile(&format!(
            r"{context},?\s+(?:um\s+|uma\s+)?(?:desconto|reducao)\s+de\s+{AMOUNT}\s*{CURRENCY}"
        )),
    ]
});

static PROMOTION_MONTHS: Lazy<Regex> =
    Lazy::new(|| compile(r"\b(\d{1,2})\s*(?:primeiros\s+)?mes(?:es)?\b"));
static PROMOTION_YEARS: Lazy<Regex> = Lazy::new(|| compile(r"\b(\d{1,2})\s*anos?\b"));
static FIRST_YEAR: Lazy<Regex> = Lazy::new(|| compile(r"\bprimeiro\s+ano\b"));

static LOCK_IN_KEYWORDS: Lazy<Regex> =
    Lazy::new(|| compile(r"fideliza|permanencia|penaliza|obrigatori"));
static LOCK_IN_NEGATION: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?:\bsem|\bnao\s+(?:ha|tem|existe)|\bisent[oa]\s+de|\bisencao\s+de)\s+(?:periodo\s+de\s+|qualquer\s+)?$")
});
static LOCK_IN_DURATION: Lazy<Regex> =
    Lazy::new(|| compile(r"\b(\d{1,3})\s*(mes(?:es)?|anos?)\b"));

/// Lock-in (fidelity period) detection result
#[derive(Debug, Clone, PartialEq)]
pub struct LockIn {
    pub has_lock_in: bool,
    pub months: Option<u32>,
    pub source: Option<LockInSource>,
    pub evidence: Option<String>,
}

impl LockIn {
    fn none() -> Self {
        LockIn {
            has_lock_in: false,
            months: None,
            source: None,
            evidence: None,
        }
    }
}

fn duration_in(text: &str) -> Option<u32> {
    let caps = LOCK_IN_DURATION.captures(text)?;
    let n: u32 = caps[1].parse().ok()?;
    if n == 0 {
        return None;
    }
    if caps[2].starts_with("ano") {
        Some(n * 12)
    } else {
        Some(n)
    }
}

/// Positions of lock-in keywords that are not negated ("sem fidelização")
fn lock_in_hits(folded: &str) -> Vec<usize> {
    LOCK_IN_KEYWORDS
        .find_iter(folded)
        .filter(|m| !LOCK_IN_NEGATION.is_match(&folded[..m.start()]))
        .map(|m| m.start())
        .collect()
}

/// Description-like free text used for keyword scans
fn description_texts(row: &ConditionRow) -> Vec<&str> {
    columns::PROMOTION_FALLBACK
        .iter()
        .filter_map(|c| row.raw.get(*c).and_then(Cell::as_text))
        .collect()
}

/// Duration near a keyword hit, then anywhere in dedicated lock-in fields
fn lock_in_months_from_text(row: &ConditionRow) -> Option<u32> {
    let near_keyword = row
        .lock_in_texts
        .iter()
        .map(String::as_str)
        .chain(description_texts(row))
        .map(fold_text)
        .find_map(|folded| {
            lock_in_hits(&folded).into_iter().find_map(|start| {
                let window: String = folded[start..].chars().take(80).collect();
                duration_in(&window)
            })
        });

    near_keyword.or_else(|| {
        row.lock_in_texts
            .iter()
            .find_map(|text| duration_in(&fold_text(text)))
    })
}

/// Detect a lock-in period. An explicit "yes" flag wins; otherwise free text
/// is scanned for fidelity/penalty keywords even when the flag says no.
pub fn detect_lock_in(row: &ConditionRow) -> LockIn {
    let flagged = row
        .lock_in_flag
        .as_deref()
        .and_then(parse_flag)
        .unwrap_or(false);

    if flagged {
        let months = row
            .lock_in_duration
            .filter(|d| *d > 0.0)
            .map(|d| d.round() as u32)
            .or_else(|| lock_in_months_from_text(row));
        return LockIn {
            has_lock_in: true,
            months,
            source: Some(LockInSource::Field),
            evidence: row.lock_in_texts.first().map(|t| truncate_chars(t, EVIDENCE_MAX_CHARS)),
        };
    }

    let evidence = row
        .lock_in_texts
        .iter()
        .map(String::as_str)
        .chain(description_texts(row))
        .find(|text| !lock_in_hits(&fold_text(text)).is_empty());

    match evidence {
        Some(text) => LockIn {
            has_lock_in: true,
            months: lock_in_months_from_text(row),
            source: Some(LockInSource::Text),
            evidence: Some(truncate_chars(text, EVIDENCE_MAX_CHARS)),
        },
        None => LockIn::none(),
    }
}

fn clamp_promotion_months(n: u32) -> u32 {
    n.clamp(1, 24)
}

/// Promotion duration in months, clamped to 1-24
pub fn extract_promotion_duration(folded: &str) -> Option<u32> {
    if let Some(caps) = PROMOTION_MONTHS.captures(folded) {
        if let Ok(n) = caps[1].parse::<u32>() {
            return Some(clamp_promotion_months(n));
        }
    }
    if let Some(caps) = PROMOTION_YEARS.captures(folded) {
        if let Ok(n) = caps[1].parse::<u32>() {
            return Some(clamp_promotion_months(n.saturating_mul(12)));
        }
    }
    if FIRST_YEAR.is_match(folded) {
        return Some(12);
    }
    None
}

/// Parse a recurring monthly discount out of free text.
/// Returns `None` unless an amount is anchored to monthly/bill context.
pub fn parse_promotion(text: &str) -> Option<Promotion> {
    let folded = fold_text(text);

    let (amount, start) = PROMOTION_PATTERNS.iter().find_map(|pattern| {
        let caps = pattern.captures(&folded)?;
        let amount = parse_decimal(&caps[1])?;
        let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        Some((amount, start))
    })?;

    if amount <= 0.0 || amount > MAX_MONTHLY_DISCOUNT {
        return None;
    }

    let extracted = extract_promotion_duration(&folded[start..])
        .or_else(|| extract_promotion_duration(&folded));

    Some(Promotion {
        fixed_euro_month: amount,
        duration_months_extracted: extracted,
        duration_months_applied: extracted
            .map(|m| m.min(12))
            .unwrap_or(ASSUMED_PROMOTION_MONTHS),
        duration_assumed: extracted.is_none(),
        is_active: None,
    })
}

/// Free-text values of the given columns, in column order
pub fn column_texts<'a>(row: &'a ConditionRow, promotion_columns: &[String]) -> Vec<&'a str> {
    if promotion_columns.is_empty() {
        columns::PROMOTION_FALLBACK
            .iter()
            .filter_map(|c| row.raw.get(*c).and_then(Cell::as_text))
            .collect()
    } else {
        promotion_columns
            .iter()
            .filter_map(|c| row.raw.get(c.as_str()).and_then(Cell::as_text))
            .collect()
    }
}

/// Build the promotion search text from the prioritized columns (or the
/// fallback list when discovery ranked none) and parse it
pub fn extract_promotion(row: &ConditionRow, promotion_columns: &[String]) -> Option<Promotion> {
    let texts = column_texts(row, promotion_columns);
    if texts.is_empty() {
        return None;
    }
    parse_promotion(&texts.join(" | ").to_lowercase())
}

pub fn detect_cycle_type(name: &str) -> Option<CycleType> {
    let folded = fold_text(name);
    if folded.contains("diari") {
        Some(CycleType::Daily)
    } else if folded.contains("semana") {
        Some(CycleType::Weekly)
    } else {
        None
    }
}

/// Parse a day-month-year date; any trailing time component is ignored
pub fn parse_source_date(value: &str) -> Option<NaiveDate> {
    let token = value.split_whitespace().next()?;
    ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(token, fmt).ok())
}

/// `start <= today <= end` at day resolution; unknown when either date is
/// missing or unparseable
pub fn is_active_between(from: Option<&str>, to: Option<&str>, today: NaiveDate) -> Option<bool> {
    let start = parse_source_date(from?)?;
    let end = parse_source_date(to?)?;
    Some(start <= today && today <= end)
}

/// Concatenated free-text snippets, capped at 200 characters
pub fn campaign_summary(row: &ConditionRow, promotion_columns: &[String]) -> Option<String> {
    let mut snippets: Vec<&str> = Vec::new();
    for text in column_texts(row, promotion_columns) {
        if !snippets.contains(&text) {
            snippets.push(text);
        }
    }
    if snippets.is_empty() {
        return None;
    }
    Some(truncate_chars(&snippets.join(" | "), CAMPAIGN_SUMMARY_MAX_CHARS))
}

/// Commercial conditions attached to an offer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConditionFlags {
    pub is_indexed: bool,
    pub new_customer_only: bool,
    pub requires_direct_debit: bool,
    pub requires_e_bill: bool,
}

fn flag_or_keyword(row: &ConditionRow, candidates: &[&str], folded: &str, keywords: &[&str]) -> bool {
    first_value(&row.raw, candidates)
        .as_deref()
        .and_then(parse_flag)
        .unwrap_or_else(|| keywords.iter().any(|k| folded.contains(k)))
}

/// Explicit yes/no columns win; otherwise fall back to keyword presence
pub fn condition_flags(row: &ConditionRow, promotion_columns: &[String]) -> ConditionFlags {
    let mut texts = column_texts(row, promotion_columns);
    texts.extend(row.name.as_deref());
    let folded = fold_text(&texts.join(" | "));

    ConditionFlags {
        is_indexed: flag_or_keyword(row, columns::INDEXED, &folded, &["indexad"]),
        new_customer_only: flag_or_keyword(
            row,
            columns::NEW_CUSTOMERS,
            &folded,
            &["novos clientes", "apenas para novas adesoes"],
        ),
        requires_direct_debit: flag_or_keyword(
            row,
            columns::DIRECT_DEBIT,
            &folded,
            &["debito direto"],
        ),
        requires_e_bill: flag_or_keyword(
            row,
            columns::E_BILL,
            &folded,
            &["fatura eletronica", "fatura digital"],
        ),
    }
}

/// Everything the builder attaches to an offer from its condition row
#[derive(Debug, Clone, PartialEq)]
pub struct OfferMetadata {
    pub lock_in: LockIn,
    pub promotion: Option<Promotion>,
    pub cycle_type: Option<CycleType>,
    pub campaign_summary: Option<String>,
    pub flags: ConditionFlags,
    pub is_offer_active: Option<bool>,
    pub is_campaign_active: Option<bool>,
    pub is_promotion_active: Option<bool>,
}

pub fn extract_metadata(
    row: &ConditionRow,
    promotion_columns: &[String],
    today: NaiveDate,
) -> OfferMetadata {
    let is_offer_active =
        is_active_between(row.valid_from.as_deref(), row.valid_to.as_deref(), today);
    let summary = campaign_summary(row, promotion_columns);

    let campaign_from = first_value(&row.raw, columns::CAMPAIGN_FROM);
    let campaign_to = first_value(&row.raw, columns::CAMPAIGN_TO);
    let is_campaign_active =
        match is_active_between(campaign_from.as_deref(), campaign_to.as_deref(), today) {
            Some(active) => Some(active),
            None if summary.is_some() => is_offer_active,
            None => None,
        };

    let promotion = extract_promotion(row, promotion_columns).map(|p| Promotion {
        is_active: is_campaign_active,
        ..p
    });
    let is_promotion_active = match &promotion {
        Some(p) => p.is_active,
        None => Some(false),
    };

    OfferMetadata {
        lock_in: detect_lock_in(row),
        promotion,
        cycle_type: row.name.as_deref().and_then(detect_cycle_type),
        campaign_summary: summary,
        flags: condition_flags(row, promotion_columns),
        is_offer_active,
        is_campaign_active,
        is_promotion_active,
    }
}
