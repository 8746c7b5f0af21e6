//! Offer builder - join pricing rows to commercial conditions and attach
//! derived metadata, producing the offer catalog and its build report

use crate::ingestion::discovery::{discover_promotion_columns, Discovery};
use crate::ingestion::metadata::{extract_metadata, OfferMetadata, EVIDENCE_MAX_CHARS};
use crate::ingestion::types::{
    BuildMetadata, BuildStatistics, BuildSummary, ConditionRow, DiscoveryReport, LockInSample,
    LockInSource, LockInTotals, Offer, PriceRow, PromotionSample, RowCounts, TariffStructure,
};
use crate::ingestion::utils::truncate_chars;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

pub const LOCK_IN_SAMPLE_LIMIT: usize = 10;
pub const PROMOTION_SAMPLE_LIMIT: usize = 10;

/// Filters applied while building, recorded in the build report
pub const FILTERS_APPLIED: &[&str] = &[
    "fornecimento == ELE",
    "TF > 0",
    "TV|TVFV|TVP > 0",
    "dedup (COM, COD_Proposta, Pot_Cont, Contagem), first seen wins",
];

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Date used for active-window checks
    pub today: NaiveDate,
    pub built_at: DateTime<Utc>,
    pub source_updated_at: Option<DateTime<Utc>>,
    pub promotion_top_columns: usize,
}

impl BuildOptions {
    pub fn now(source_updated_at: Option<DateTime<Utc>>, promotion_top_columns: usize) -> Self {
        let built_at = Utc::now();
        BuildOptions {
            today: built_at.date_naive(),
            built_at,
            source_updated_at,
            promotion_top_columns,
        }
    }
}

/// Built offer list plus the statistics/discovery side artifact
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub offers: Vec<Offer>,
    pub metadata: BuildMetadata,
}

/// Logs the first few drops per reason at warn, the rest at debug
#[derive(Default)]
struct DropLog {
    seen: HashMap<&'static str, usize>,
}

impl DropLog {
    fn record(&mut self, reason: &'static str, row: &PriceRow) {
        let n = self.seen.entry(reason).or_insert(0);
        *n += 1;
        if *n <= 10 {
            warn!(
                "Dropping {}/{} {} kVA tariff {}: {}",
                row.provider, row.proposal, row.power_kva, row.tariff, reason
            );
        } else {
            debug!(
                "Dropping {}/{} {} kVA tariff {}: {}",
                row.provider, row.proposal, row.power_kva, row.tariff, reason
            );
        }
    }
}

fn dedup_key(row: &PriceRow) -> (String, String, u64, TariffStructure) {
    // Power keyed in hundredths of a kVA so 6.9 and 6.90 collide
    let power = (row.power_kva * 100.0).round().max(0.0) as u64;
    (row.provider.clone(), row.proposal.clone(), power, row.tariff)
}

/// Assemble one offer. Pure function - no side effects.
pub fn build_offer(price: &PriceRow, condition: &ConditionRow, meta: OfferMetadata) -> Offer {
    Offer {
        provider: price.provider.clone(),
        proposal: price.proposal.clone(),
        power_kva: price.power_kva,
        tariff: price.tariff,
        fixed_daily: price.fixed_daily,
        energy_primary: price.energy_primary,
        energy_secondary: price.energy_secondary,
        energy_off_peak: price.energy_off_peak,
        tariff_name: condition.name.clone(),
        cycle_type: meta.cycle_type,
        website: condition.website.clone(),
        phone: condition.phone.clone(),
        supply: condition.supply.trim().to_uppercase(),
        segment: condition.segment.clone(),
        valid_from: condition.valid_from.clone(),
        valid_to: condition.valid_to.clone(),
        is_indexed: meta.flags.is_indexed,
        has_lock_in: meta.lock_in.has_lock_in,
        lock_in_months: meta.lock_in.months,
        lock_in_source: meta.lock_in.source,
        promotion: meta.promotion,
        new_customer_only: meta.flags.new_customer_only,
        requires_direct_debit: meta.flags.requires_direct_debit,
        requires_e_bill: meta.flags.requires_e_bill,
        campaign_summary: meta.campaign_summary,
        is_offer_active: meta.is_offer_active,
        is_campaign_active: meta.is_campaign_active,
        is_promotion_active: meta.is_promotion_active,
    }
}

/// Aggregate build statistics over the finished offer list
pub fn compute_statistics(offers: &[Offer]) -> BuildStatistics {
    let mut stats = BuildStatistics::default();
    for offer in offers {
        if offer.has_lock_in {
            stats.lock_in_count += 1;
            match offer.lock_in_source {
                Some(LockInSource::Field) => stats.lock_in_by_source_totals.field += 1,
                Some(LockInSource::Text) => stats.lock_in_by_source_totals.text += 1,
                None => {}
            }
        }
        if offer.is_offer_active == Some(true) {
            stats.active_offers_count += 1;
        }
        if let Some(promotion) = &offer.promotion {
            stats.promotions_with_metadata_count += 1;
            match promotion.is_active {
                Some(true) => {
                    stats.promotions_with_known_active_status_count += 1;
                    stats.promotions_active_count += 1;
                }
                Some(false) => stats.promotions_with_known_active_status_count += 1,
                None => {}
            }
        }
    }
    // Promotions are never priced; the count stays zero by construction.
    stats.promotions_applied_count = 0;
    stats
}

/// Join, filter, dedup and enrich. Rows that cannot be priced are dropped,
/// never fatal.
pub fn build_catalog(
    prices: &[PriceRow],
    conditions: &[ConditionRow],
    options: &BuildOptions,
) -> Catalog {
    info!(
        "Building catalog from {} price rows and {} condition rows",
        prices.len(),
        conditions.len()
    );

    // Step 1: discover promotion columns for the whole batch
    let Discovery {
        ranked,
        top_columns,
        snippets,
    } = discover_promotion_columns(conditions, options.promotion_top_columns);

    // Step 2: (provider, proposal) -> first-seen condition row
    let mut lookup: HashMap<(&str, &str), &ConditionRow> = HashMap::new();
    for condition in conditions {
        lookup
            .entry((condition.provider.as_str(), condition.proposal.as_str()))
            .or_insert(condition);
    }

    let mut counts = RowCounts {
        price_rows: prices.len(),
        condition_rows: conditions.len(),
        ..RowCounts::default()
    };
    let mut drops = DropLog::default();
    let mut seen = HashSet::new();
    let mut offers = Vec::new();
    let mut lock_in_samples = Vec::new();
    let mut promotion_samples = Vec::new();

    // Step 3: one offer per surviving price row
    for price in prices {
        let condition = match lookup.get(&(price.provider.as_str(), price.proposal.as_str())) {
            Some(condition) => *condition,
            None => {
                counts.skipped_missing_condition += 1;
                drops.record("no matching commercial conditions", price);
                continue;
            }
        };

        if !condition.is_electricity() {
            counts.skipped_not_electricity += 1;
            continue;
        }

        if price.fixed_daily <= 0.0 || price.energy_primary <= 0.0 {
            counts.skipped_unpriceable += 1;
            drops.record("non-positive fixed or energy rate", price);
            continue;
        }

        if !seen.insert(dedup_key(price)) {
            counts.skipped_duplicate += 1;
            debug!(
                "Duplicate {}/{} {} kVA tariff {}",
                price.provider, price.proposal, price.power_kva, price.tariff
            );
            continue;
        }

        let meta = extract_metadata(condition, &top_columns, options.today);

        if meta.lock_in.has_lock_in && lock_in_samples.len() < LOCK_IN_SAMPLE_LIMIT {
            if let Some(source) = meta.lock_in.source {
                lock_in_samples.push(LockInSample {
                    provider: price.provider.clone(),
                    proposal: price.proposal.clone(),
                    months: meta.lock_in.months,
                    source,
                    snippet: meta.lock_in.evidence.clone(),
                });
            }
        }

        if let (Some(promotion), Some(summary)) = (&meta.promotion, &meta.campaign_summary) {
            if promotion_samples.len() < PROMOTION_SAMPLE_LIMIT {
                promotion_samples.push(PromotionSample {
                    provider: price.provider.clone(),
                    proposal: price.proposal.clone(),
                    promotion: promotion.clone(),
                    snippet: truncate_chars(summary, EVIDENCE_MAX_CHARS),
                });
            }
        }

        offers.push(build_offer(price, condition, meta));
    }

    counts.offers = offers.len();

    // Step 4: statistics
    let statistics = compute_statistics(&offers);
    let lock_in_by_source = LockInTotals {
        field: statistics.lock_in_by_source_totals.field,
        text: statistics.lock_in_by_source_totals.text,
    };

    info!(
        "Built {} offers (missing conditions: {}, non-ELE: {}, unpriceable: {}, duplicates: {})",
        counts.offers,
        counts.skipped_missing_condition,
        counts.skipped_not_electricity,
        counts.skipped_unpriceable,
        counts.skipped_duplicate
    );
    info!(
        "Lock-in: {} (field {}, text {}); promotions with metadata: {}",
        statistics.lock_in_count,
        statistics.lock_in_by_source_totals.field,
        statistics.lock_in_by_source_totals.text,
        statistics.promotions_with_metadata_count
    );

    Catalog {
        metadata: BuildMetadata {
            build: BuildSummary {
                built_at: options.built_at,
                source_updated_at: options.source_updated_at,
                offers_count: offers.len(),
                row_counts: counts,
                filters_applied: FILTERS_APPLIED.iter().map(|f| f.to_string()).collect(),
                statistics,
            },
            discovery: DiscoveryReport {
                promotion_field_hits: ranked,
                sample_promotion_snippets: snippets,
                lock_in_samples,
                lock_in_by_source,
                promotion_parsed_samples: promotion_samples,
            },
        },
        offers,
    }
}
