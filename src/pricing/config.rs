//! Pricing constants: taxes, default consumption splits and estimator
//! assumptions. Every value can be overridden from the environment.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Share of consumption per time-of-use period. Only the fields relevant to a
/// tariff structure are read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub off_peak: f64,
    #[serde(default)]
    pub mid: f64,
    #[serde(default)]
    pub peak: f64,
}

impl Distribution {
    /// Shares scaled to sum to 1. `None` when nothing positive is left.
    pub fn normalized(&self) -> Option<Distribution> {
        let parts = [self.off_peak, self.mid, self.peak];
        if parts.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return None;
        }
        let total: f64 = parts.iter().sum();
        if total <= 0.0 {
            return None;
        }
        Some(Distribution {
            off_peak: self.off_peak / total,
            mid: self.mid / total,
            peak: self.peak / total,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingConfig {
    /// VAT rate applied to the whole bill (0.23 = 23%)
    pub vat_rate: f64,
    /// Special consumption tax (IEC), euros per kWh
    pub iec_per_kwh: f64,
    /// Audiovisual contribution, euros per month
    pub audiovisual_monthly: f64,
    /// Flat month length used for the fixed term
    pub days_per_month: f64,
    /// Default off-peak share for two-rate tariffs
    pub bi_hourly_off_peak_share: f64,
    /// Default split for three-rate tariffs
    pub tri_hourly_split: Distribution,
    pub estimator_average_price: f64,
    pub estimator_fixed_daily: f64,
    pub default_power_kva: f64,
    pub min_consumption_kwh: f64,
    pub max_consumption_kwh: f64,
    /// Results below this are treated as data errors rather than prices
    pub min_plausible_monthly_cost: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        PricingConfig {
            vat_rate: 0.23,
            iec_per_kwh: 0.001,
            audiovisual_monthly: 2.85,
            days_per_month: 30.0,
            bi_hourly_off_peak_share: 0.40,
            tri_hourly_split: Distribution {
                off_peak: 0.40,
                mid: 0.40,
                peak: 0.20,
            },
            estimator_average_price: 0.16,
            estimator_fixed_daily: 0.30,
            default_power_kva: 6.9,
            min_consumption_kwh: 50.0,
            max_consumption_kwh: 5000.0,
            min_plausible_monthly_cost: 5.0,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .replace(',', ".")
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        Err(_) => Ok(default),
    }
}

impl PricingConfig {
    pub fn vat_multiplier(&self) -> f64 {
        1.0 + self.vat_rate
    }

    pub fn from_env() -> Result<Self> {
        let d = PricingConfig::default();
        let config = PricingConfig {
            vat_rate: env_or("TARIFF_VAT_RATE", d.vat_rate)?,
            iec_per_kwh: env_or("TARIFF_IEC_PER_KWH", d.iec_per_kwh)?,
            audiovisual_monthly: env_or("TARIFF_AUDIOVISUAL_MONTHLY", d.audiovisual_monthly)?,
            days_per_month: env_or("TARIFF_DAYS_PER_MONTH", d.days_per_month)?,
            bi_hourly_off_peak_share: env_or(
                "TARIFF_BI_OFF_PEAK_SHARE",
                d.bi_hourly_off_peak_share,
            )?,
            tri_hourly_split: Distribution {
                off_peak: env_or("TARIFF_TRI_OFF_PEAK_SHARE", d.tri_hourly_split.off_peak)?,
                mid: env_or("TARIFF_TRI_MID_SHARE", d.tri_hourly_split.mid)?,
                peak: env_or("TARIFF_TRI_PEAK_SHARE", d.tri_hourly_split.peak)?,
            },
            estimator_average_price: env_or(
                "TARIFF_ESTIMATOR_AVERAGE_PRICE",
                d.estimator_average_price,
            )?,
            estimator_fixed_daily: env_or("TARIFF_ESTIMATOR_FIXED_DAILY", d.estimator_fixed_daily)?,
            default_power_kva: env_or("TARIFF_DEFAULT_POWER_KVA", d.default_power_kva)?,
            min_consumption_kwh: env_or("TARIFF_MIN_CONSUMPTION_KWH", d.min_consumption_kwh)?,
            max_consumption_kwh: env_or("TARIFF_MAX_CONSUMPTION_KWH", d.max_consumption_kwh)?,
            min_plausible_monthly_cost: env_or(
                "TARIFF_MIN_PLAUSIBLE_MONTHLY_COST",
                d.min_plausible_monthly_cost,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject bounds the estimator cannot clamp to
    pub fn validate(&self) -> Result<()> {
        let (min, max) = (self.min_consumption_kwh, self.max_consumption_kwh);
        if min.is_nan() || max.is_nan() || min > max {
            bail!(
                "TARIFF_MIN_CONSUMPTION_KWH ({}) must not exceed TARIFF_MAX_CONSUMPTION_KWH ({})",
                min,
                max
            );
        }
        Ok(())
    }
}
