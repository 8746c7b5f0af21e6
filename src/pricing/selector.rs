//! Offer selector - filter the catalog and rank by cost with a deterministic
//! tie-break, plus the savings comparison built on top of it

use crate::error::SelectionError;
use crate::ingestion::types::{Offer, TariffStructure};
use crate::pricing::calculator::{annual_effective_cost, calculate_monthly_cost};
use crate::pricing::config::{Distribution, PricingConfig};
use crate::pricing::profile::ResolvedProfile;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, info};

/// An offer with its computed costs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedOffer<'a> {
    #[serde(flatten)]
    pub offer: &'a Offer,
    pub monthly_cost: f64,
    pub annual_cost_effective: f64,
}

/// Lock-in offers are never candidates; that is product policy, not a data
/// quality filter.
fn is_candidate(offer: &Offer, power_kva: f64, tariff: TariffStructure) -> bool {
    offer.is_priceable()
        && offer.matches_power(power_kva)
        && offer.tariff == tariff
        && !offer.has_lock_in
}

fn rank(a: &RankedOffer<'_>, b: &RankedOffer<'_>) -> Ordering {
    a.annual_cost_effective
        .total_cmp(&b.annual_cost_effective)
        .then_with(|| a.monthly_cost.total_cmp(&b.monthly_cost))
        .then_with(|| {
            a.offer
                .display_name()
                .to_lowercase()
                .cmp(&b.offer.display_name().to_lowercase())
        })
        .then_with(|| a.offer.provider.cmp(&b.offer.provider))
        .then_with(|| a.offer.proposal.cmp(&b.offer.proposal))
}

/// Every candidate with a finite positive cost, cheapest first
pub fn rank_offers<'a>(
    offers: &'a [Offer],
    consumption_kwh: f64,
    power_kva: f64,
    tariff: TariffStructure,
    distribution: Option<&Distribution>,
    config: &PricingConfig,
) -> Result<Vec<RankedOffer<'a>>, SelectionError> {
    let candidates: Vec<&Offer> = offers
        .iter()
        .filter(|o| is_candidate(o, power_kva, tariff))
        .collect();

    if candidates.is_empty() {
        return Err(SelectionError::NoValidOffer { power_kva, tariff });
    }

    let mut ranked: Vec<RankedOffer<'a>> = candidates
        .into_iter()
        .map(|offer| RankedOffer {
            offer,
            monthly_cost: calculate_monthly_cost(
                offer,
                consumption_kwh,
                power_kva,
                distribution,
                config,
            ),
            annual_cost_effective: annual_effective_cost(
                offer,
                consumption_kwh,
                power_kva,
                distribution,
                config,
            ),
        })
        .filter(|r| {
            let valid = r.monthly_cost.is_finite()
                && r.monthly_cost > 0.0
                && r.annual_cost_effective.is_finite()
                && r.annual_cost_effective > 0.0;
            if !valid {
                debug!(
                    "Discarding {}/{}: cost {}",
                    r.offer.provider, r.offer.proposal, r.monthly_cost
                );
            }
            valid
        })
        .collect();

    if ranked.is_empty() {
        return Err(SelectionError::NoOfferWithValidCost { power_kva, tariff });
    }

    ranked.sort_by(rank);
    Ok(ranked)
}

/// Cheapest eligible offer for the requested power and tariff structure
pub fn find_best<'a>(
    offers: &'a [Offer],
    consumption_kwh: f64,
    power_kva: f64,
    tariff: TariffStructure,
    distribution: Option<&Distribution>,
    config: &PricingConfig,
) -> Result<RankedOffer<'a>, SelectionError> {
    let best = rank_offers(offers, consumption_kwh, power_kva, tariff, distribution, config)?
        .into_iter()
        .next()
        .ok_or(SelectionError::NoOfferWithValidCost { power_kva, tariff })?;

    info!(
        "Best offer for {} kWh at {} kVA ({}): {}/{} at {:.2} EUR/month",
        consumption_kwh,
        power_kva,
        tariff,
        best.offer.provider,
        best.offer.proposal,
        best.monthly_cost
    );
    Ok(best)
}

/// Single-rate shortcut used when no current tariff is being compared
pub fn find_best_simple<'a>(
    offers: &'a [Offer],
    consumption_kwh: f64,
    power_kva: f64,
    config: &PricingConfig,
) -> Result<RankedOffer<'a>, SelectionError> {
    find_best(
        offers,
        consumption_kwh,
        power_kva,
        TariffStructure::Simple,
        None,
        config,
    )
}

/// Best offer and the savings against what the household pays today
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison<'a> {
    pub best: RankedOffer<'a>,
    pub consumption_kwh: f64,
    pub power_kva: f64,
    pub tariff: TariffStructure,
    pub current_monthly_spend: Option<f64>,
    pub monthly_savings: Option<f64>,
    pub annual_savings: Option<f64>,
}

/// Pick the best offer for a resolved profile and report savings versus the
/// current monthly spend, when one is known
pub fn compare<'a>(
    offers: &'a [Offer],
    profile: &ResolvedProfile,
    current_monthly_spend: Option<f64>,
    distribution: Option<&Distribution>,
    config: &PricingConfig,
) -> Result<Comparison<'a>, SelectionError> {
    let best = match profile.current_tariff {
        Some(tariff) => find_best(
            offers,
            profile.consumption_kwh,
            profile.power_kva,
            tariff,
            distribution,
            config,
        )?,
        None => find_best_simple(offers, profile.consumption_kwh, profile.power_kva, config)?,
    };

    if best.monthly_cost < config.min_plausible_monthly_cost {
        return Err(SelectionError::ImplausibleCost {
            cost: best.monthly_cost,
        });
    }

    let spend = current_monthly_spend.filter(|s| s.is_finite() && *s > 0.0);
    let monthly_savings = spend.map(|s| s - best.monthly_cost);

    Ok(Comparison {
        tariff: best.offer.tariff,
        consumption_kwh: profile.consumption_kwh,
        power_kva: profile.power_kva,
        current_monthly_spend: spend,
        monthly_savings,
        annual_savings: monthly_savings.map(|m| m * 12.0),
        best,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::calculator::tests::offer;

    fn named(name: &str, provider: &str, fixed: f64, primary: f64) -> Offer {
        let mut o = offer(1, fixed, primary);
        o.tariff_name = Some(name.to_string());
        o.provider = provider.to_string();
        o.proposal = format!("{}-1", provider);
        o
    }

    fn catalog() -> Vec<Offer> {
        let mut locked = named("Aaa Fidelizada", "LCK", 0.10, 0.05);
        locked.has_lock_in = true;

        let mut bi = named("Bi Barata", "BIH", 0.10, 0.08);
        bi.tariff = TariffStructure::BiHourly;
        bi.energy_secondary = Some(0.05);

        let mut other_power = named("Outra Potência", "POW", 0.10, 0.05);
        other_power.power_kva = 3.45;

        vec![
            named("Zeta", "ZZZ", 0.25, 0.16),
            named("beta", "BBB", 0.25, 0.15),
            named("Alfa", "AAA", 0.25, 0.15),
            named("Cara", "CCC", 0.40, 0.20),
            locked,
            bi,
            other_power,
            named("Sem preço", "NIL", 0.0, 0.15),
        ]
    }

    #[test]
    fn test_find_best_cheapest_with_name_tie_break() {
        let offers = catalog();
        let config = PricingConfig::default();

        let best = find_best(&offers, 250.0, 6.9, TariffStructure::Simple, None, &config).unwrap();

        // Alfa and beta tie on price; lowercase name order picks Alfa
        assert_eq!(best.offer.provider, "AAA");
        assert!((best.annual_cost_effective - best.monthly_cost * 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_tie_break_ignores_input_order() {
        let mut offers = catalog();
        offers.reverse();
        let config = PricingConfig::default();

        let best = find_best(&offers, 250.0, 6.9, TariffStructure::Simple, None, &config).unwrap();
        assert_eq!(best.offer.provider, "AAA");
    }

    #[test]
    fn test_lock_in_never_selected() {
        let offers = catalog();
        let config = PricingConfig::default();

        let ranked =
            rank_offers(&offers, 250.0, 6.9, TariffStructure::Simple, None, &config).unwrap();

        assert!(ranked.iter().all(|r| !r.offer.has_lock_in));
        assert!(ranked.iter().all(|r| r.offer.provider != "NIL"));
        assert_eq!(ranked.len(), 4);
        assert_eq!(ranked.last().unwrap().offer.provider, "CCC");
    }

    #[test]
    fn test_only_lock_in_candidates_is_no_valid_offer() {
        let mut only = named("Fidelizada", "LCK", 0.10, 0.05);
        only.has_lock_in = true;
        let config = PricingConfig::default();

        let err = find_best(&[only], 250.0, 6.9, TariffStructure::Simple, None, &config)
            .unwrap_err();
        assert!(matches!(err, SelectionError::NoValidOffer { .. }));
    }

    #[test]
    fn test_non_standard_power_is_no_valid_offer() {
        let offers = catalog();
        let config = PricingConfig::default();

        let err = find_best(&offers, 250.0, 99.0, TariffStructure::Simple, None, &config)
            .unwrap_err();
        assert_eq!(
            err,
            SelectionError::NoValidOffer {
                power_kva: 99.0,
                tariff: TariffStructure::Simple
            }
        );
    }

    #[test]
    fn test_non_finite_cost_is_no_offer_with_valid_cost() {
        let offers = vec![named("Infinita", "INF", f64::INFINITY, 0.15)];
        let config = PricingConfig::default();

        let err = find_best(&offers, 250.0, 6.9, TariffStructure::Simple, None, &config)
            .unwrap_err();
        assert!(matches!(err, SelectionError::NoOfferWithValidCost { .. }));
    }

    #[test]
    fn test_tariff_must_match_exactly() {
        let offers = catalog();
        let config = PricingConfig::default();

        let best =
            find_best(&offers, 250.0, 6.9, TariffStructure::BiHourly, None, &config).unwrap();
        assert_eq!(best.offer.provider, "BIH");
        assert!(find_best(&offers, 250.0, 6.9, TariffStructure::TriHourly, None, &config).is_err());
    }

    #[test]
    fn test_power_tolerance() {
        let offers = catalog();
        let config = PricingConfig::default();

        assert!(find_best_simple(&offers, 250.0, 6.9 + 1e-9, &config).is_ok());
        let best = find_best_simple(&offers, 250.0, 3.45, &config).unwrap();
        assert_eq!(best.offer.provider, "POW");
    }

    #[test]
    fn test_compare_reports_savings() {
        let offers = catalog();
        let config = PricingConfig::default();
        let profile = ResolvedProfile {
            consumption_kwh: 250.0,
            power_kva: 6.9,
            current_tariff: None,
            current_provider: None,
        };

        let comparison = compare(&offers, &profile, Some(80.0), None, &config).unwrap();

        assert_eq!(comparison.best.offer.provider, "AAA");
        let expected = 80.0 - comparison.best.monthly_cost;
        assert!((comparison.monthly_savings.unwrap() - expected).abs() < 1e-9);
        assert!((comparison.annual_savings.unwrap() - expected * 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_compare_uses_current_tariff() {
        let offers = catalog();
        let config = PricingConfig::default();
        let profile = ResolvedProfile {
            consumption_kwh: 250.0,
            power_kva: 6.9,
            current_tariff: Some(TariffStructure::BiHourly),
            current_provider: Some("EDP".to_string()),
        };

        let comparison = compare(&offers, &profile, None, None, &config).unwrap();

        assert_eq!(comparison.best.offer.provider, "BIH");
        assert_eq!(comparison.monthly_savings, None);
    }

    #[test]
    fn test_compare_rejects_implausible_cost() {
        let offers = vec![named("Quase grátis", "LOW", 0.001, 0.0001)];
        let config = PricingConfig {
            audiovisual_monthly: 0.0,
            ..PricingConfig::default()
        };
        let profile = ResolvedProfile {
            consumption_kwh: 50.0,
            power_kva: 6.9,
            current_tariff: None,
            current_provider: None,
        };

        let err = compare(&offers, &profile, Some(50.0), None, &config).unwrap_err();
        assert!(matches!(err, SelectionError::ImplausibleCost { .. }));
    }
}
