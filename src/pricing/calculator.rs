//! Cost calculator - monthly cost of an offer for a consumption profile.
//!
//! Reads only the tariff structure and rate fields of an offer. Promotion
//! metadata is never consulted, so extracted discount text cannot turn into a
//! savings claim.

use crate::ingestion::types::{Offer, Rates};
use crate::pricing::config::{Distribution, PricingConfig};
use serde::Serialize;
use tracing::debug;

/// Monthly cost split into its terms, all in euros
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub fixed_term: f64,
    pub variable_term: f64,
    pub iec: f64,
    pub audiovisual: f64,
    pub vat: f64,
    pub total: f64,
}

fn variable_term(
    rates: Rates,
    consumption: f64,
    distribution: Option<&Distribution>,
    config: &PricingConfig,
) -> f64 {
    match rates {
        Rates::Simple { energy } => consumption * energy,
        Rates::BiHourly { peak, off_peak } => {
            let share = distribution
                .map(|d| d.off_peak)
                .filter(|s| (0.0..=1.0).contains(s))
                .unwrap_or(config.bi_hourly_off_peak_share);
            consumption * share * off_peak + consumption * (1.0 - share) * peak
        }
        Rates::TriHourly {
            peak,
            mid,
            off_peak,
        } => {
            let split = distribution
                .and_then(Distribution::normalized)
                .or_else(|| config.tri_hourly_split.normalized())
                .unwrap_or(Distribution {
                    off_peak: 0.0,
                    mid: 0.0,
                    peak: 1.0,
                });
            consumption * split.off_peak * off_peak
                + consumption * split.mid * mid
                + consumption * split.peak * peak
        }
    }
}

/// Full breakdown of the monthly cost
pub fn cost_breakdown(
    offer: &Offer,
    consumption_kwh: f64,
    power_kva: f64,
    distribution: Option<&Distribution>,
    config: &PricingConfig,
) -> CostBreakdown {
    if !offer.matches_power(power_kva) {
        debug!(
            "Pricing {}/{} at {} kVA for a {} kVA request",
            offer.provider, offer.proposal, offer.power_kva, power_kva
        );
    }

    let consumption = consumption_kwh.max(0.0);
    let fixed_term = offer.fixed_daily * config.days_per_month;
    let variable_term = variable_term(offer.rates(), consumption, distribution, config);
    let iec = consumption * config.iec_per_kwh;
    let audiovisual = config.audiovisual_monthly;

    let subtotal = fixed_term + variable_term + iec + audiovisual;
    let total = (subtotal * config.vat_multiplier()).max(0.0);

    CostBreakdown {
        fixed_term,
        variable_term,
        iec,
        audiovisual,
        vat: total - subtotal,
        total,
    }
}

/// Monthly cost in euros, VAT included
pub fn calculate_monthly_cost(
    offer: &Offer,
    consumption_kwh: f64,
    power_kva: f64,
    distribution: Option<&Distribution>,
    config: &PricingConfig,
) -> f64 {
    cost_breakdown(offer, consumption_kwh, power_kva, distribution, config).total
}

/// Twelve months of the monthly cost. No promotion discounting.
pub fn annual_effective_cost(
    offer: &Offer,
    consumption_kwh: f64,
    power_kva: f64,
    distribution: Option<&Distribution>,
    config: &PricingConfig,
) -> f64 {
    calculate_monthly_cost(offer, consumption_kwh, power_kva, distribution, config) * 12.0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ingestion::types::{Promotion, TariffStructure};

    pub(crate) fn offer(tariff: u8, fixed: f64, primary: f64) -> Offer {
        Offer {
            provider: "EDP".to_string(),
            proposal: "P1".to_string(),
            power_kva: 6.9,
            tariff: TariffStructure::from(tariff),
            fixed_daily: fixed,
            energy_primary: primary,
            energy_secondary: None,
            energy_off_peak: None,
            tariff_name: Some("Tarifa Casa".to_string()),
            cycle_type: None,
            website: None,
            phone: None,
            supply: "ELE".to_string(),
            segment: None,
            valid_from: None,
            valid_to: None,
            is_indexed: false,
            has_lock_in: false,
            lock_in_months: None,
            lock_in_source: None,
            promotion: None,
            new_customer_only: false,
            requires_direct_debit: false,
            requires_e_bill: false,
            campaign_summary: None,
            is_offer_active: None,
            is_campaign_active: None,
            is_promotion_active: None,
        }
    }

    #[test]
    fn test_single_rate_scenario() {
        let config = PricingConfig::default();
        let cost = calculate_monthly_cost(&offer(1, 0.25, 0.16), 250.0, 6.9, None, &config);

        // (7.50 fixed + 40.00 energy + 0.25 IEC + 2.85 audiovisual) * 1.23
        let expected = (7.5 + 40.0 + 250.0 * 0.001 + 2.85) * 1.23;
        assert!((cost - expected).abs() < 1e-9);
        assert!((cost - 62.238).abs() < 1e-6);
    }

    #[test]
    fn test_breakdown_terms() {
        let config = PricingConfig::default();
        let b = cost_breakdown(&offer(1, 0.25, 0.16), 250.0, 6.9, None, &config);

        assert!((b.fixed_term - 7.5).abs() < 1e-12);
        assert!((b.variable_term - 40.0).abs() < 1e-9);
        assert!((b.iec - 0.25).abs() < 1e-12);
        assert_eq!(b.audiovisual, 2.85);
        assert!((b.fixed_term + b.variable_term + b.iec + b.audiovisual + b.vat - b.total).abs() < 1e-9);
    }

    #[test]
    fn test_bi_hourly_default_and_override() {
        let config = PricingConfig::default();
        let mut bi = offer(2, 0.25, 0.20);
        bi.energy_secondary = Some(0.10);

        let default = cost_breakdown(&bi, 100.0, 6.9, None, &config);
        // 40% off-peak at 0.10, 60% peak at 0.20
        assert!((default.variable_term - (4.0 + 12.0)).abs() < 1e-9);

        let all_off_peak = Distribution {
            off_peak: 1.0,
            mid: 0.0,
            peak: 0.0,
        };
        let shifted = cost_breakdown(&bi, 100.0, 6.9, Some(&all_off_peak), &config);
        assert!((shifted.variable_term - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_tri_hourly_split() {
        let config = PricingConfig::default();
        let mut tri = offer(3, 0.25, 0.30);
        tri.energy_secondary = Some(0.20);
        tri.energy_off_peak = Some(0.10);

        let b = cost_breakdown(&tri, 100.0, 6.9, None, &config);
        // 40 kWh * 0.10 + 40 kWh * 0.20 + 20 kWh * 0.30
        assert!((b.variable_term - (4.0 + 8.0 + 6.0)).abs() < 1e-9);

        let custom = Distribution {
            off_peak: 1.0,
            mid: 1.0,
            peak: 2.0,
        };
        let b = cost_breakdown(&tri, 100.0, 6.9, Some(&custom), &config);
        assert!((b.variable_term - (2.5 + 5.0 + 15.0)).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_structure_uses_single_rate() {
        let config = PricingConfig::default();
        let mut odd = offer(9, 0.25, 0.16);
        odd.energy_secondary = Some(0.01);

        let odd_cost = calculate_monthly_cost(&odd, 250.0, 6.9, None, &config);
        let simple_cost = calculate_monthly_cost(&offer(1, 0.25, 0.16), 250.0, 6.9, None, &config);
        assert_eq!(odd_cost, simple_cost);
    }

    #[test]
    fn test_promotion_never_changes_cost() {
        let config = PricingConfig::default();
        let plain = offer(1, 0.25, 0.16);
        let mut promoted = plain.clone();
        promoted.promotion = Some(Promotion {
            fixed_euro_month: 10.0,
            duration_months_extracted: Some(12),
            duration_months_applied: 12,
            duration_assumed: false,
            is_active: Some(true),
        });
        promoted.is_promotion_active = Some(true);

        for consumption in [0.0, 50.0, 250.0, 1200.0] {
            assert_eq!(
                calculate_monthly_cost(&plain, consumption, 6.9, None, &config),
                calculate_monthly_cost(&promoted, consumption, 6.9, None, &config)
            );
            assert_eq!(
                annual_effective_cost(&plain, consumption, 6.9, None, &config),
                annual_effective_cost(&promoted, consumption, 6.9, None, &config)
            );
        }
    }

    #[test]
    fn test_negative_consumption_is_clamped() {
        let config = PricingConfig::default();
        let cost = calculate_monthly_cost(&offer(1, 0.25, 0.16), -10.0, 6.9, None, &config);
        assert!(cost.is_finite() && cost > 0.0);
        assert_eq!(cost, calculate_monthly_cost(&offer(1, 0.25, 0.16), 0.0, 6.9, None, &config));
    }

    #[test]
    fn test_annual_is_twelve_months() {
        let config = PricingConfig::default();
        let o = offer(1, 0.25, 0.16);
        let monthly = calculate_monthly_cost(&o, 250.0, 6.9, None, &config);
        assert_eq!(annual_effective_cost(&o, 250.0, 6.9, None, &config), monthly * 12.0);
    }
}
