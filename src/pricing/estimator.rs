//! Consumption estimator - approximate monthly kWh from a bill amount

use crate::ingestion::types::{Offer, TariffStructure};
use crate::ingestion::utils::median;
use crate::pricing::config::PricingConfig;
use serde::Serialize;
use tracing::debug;

/// Rates the single-rate cost formula is inverted with
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Calibration {
    pub average_price: f64,
    pub fixed_daily: f64,
    /// Number of catalog offers the medians came from, 0 for the defaults
    pub sample_size: usize,
}

impl Calibration {
    pub fn defaults(config: &PricingConfig) -> Self {
        Calibration {
            average_price: config.estimator_average_price,
            fixed_daily: config.estimator_fixed_daily,
            sample_size: 0,
        }
    }
}

/// Median single-rate prices at the default power. Falls back to the
/// configured constants when the catalog has nothing usable.
pub fn calibrate(offers: &[Offer], config: &PricingConfig) -> Calibration {
    let sample: Vec<&Offer> = offers
        .iter()
        .filter(|o| {
            o.is_priceable()
                && o.tariff == TariffStructure::Simple
                && o.matches_power(config.default_power_kva)
        })
        .collect();

    let fixed: Vec<f64> = sample.iter().map(|o| o.fixed_daily).collect();
    let energy: Vec<f64> = sample.iter().map(|o| o.energy_primary).collect();

    match (median(&fixed), median(&energy)) {
        (Some(fixed_daily), Some(average_price)) => Calibration {
            average_price,
            fixed_daily,
            sample_size: sample.len(),
        },
        _ => Calibration::defaults(config),
    }
}

/// Invert the single-rate formula with the given rates
pub fn estimate_with(monthly_bill: f64, calibration: &Calibration, config: &PricingConfig) -> f64 {
    let (min, max) = (config.min_consumption_kwh, config.max_consumption_kwh);
    if !monthly_bill.is_finite() || monthly_bill <= 0.0 {
        return min;
    }

    let before_vat = monthly_bill / config.vat_multiplier();
    let energy_spend =
        before_vat - calibration.fixed_daily * config.days_per_month - config.audiovisual_monthly;
    let per_kwh = calibration.average_price + config.iec_per_kwh;
    if per_kwh <= 0.0 {
        return min;
    }

    let estimate = energy_spend / per_kwh;
    debug!(
        "Estimated {:.1} kWh from a {:.2} EUR bill (price {:.4}, fixed {:.4})",
        estimate, monthly_bill, calibration.average_price, calibration.fixed_daily
    );
    if estimate.is_finite() {
        estimate.clamp(min, max)
    } else {
        min
    }
}

/// Monthly kWh for a bill amount, calibrated against the catalog when one is given
pub fn estimate_consumption(
    monthly_bill: f64,
    catalog: Option<&[Offer]>,
    config: &PricingConfig,
) -> f64 {
    let calibration = match catalog {
        Some(offers) => calibrate(offers, config),
        None => Calibration::defaults(config),
    };
    estimate_with(monthly_bill, &calibration, config)
}
