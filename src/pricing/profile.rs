//! Consumption profiles - bill amount, manual entry, or an invoice extract -
//! resolved to the consumption/power/tariff triple the selector works with

use crate::error::ProfileError;
use crate::ingestion::types::{Offer, TariffStructure};
use crate::ingestion::utils::fold_text;
use crate::pricing::config::PricingConfig;
use crate::pricing::estimator::estimate_consumption;
use serde::{Deserialize, Serialize};

/// Best-effort fields pulled out of a scanned invoice. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceExtract {
    pub consumption: Option<f64>,
    pub power: Option<f64>,
    pub provider: Option<String>,
    /// Free-form label as printed on the invoice ("Simples", "Bi-horária", ...)
    pub tariff_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ConsumptionProfile {
    Bill {
        monthly_bill: f64,
        #[serde(default)]
        power_kva: Option<f64>,
    },
    Manual {
        consumption_kwh: f64,
        power_kva: f64,
        #[serde(default)]
        tariff: Option<TariffStructure>,
    },
    Invoice(InvoiceExtract),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedProfile {
    pub consumption_kwh: f64,
    pub power_kva: f64,
    /// Tariff the household is on today, when known
    pub current_tariff: Option<TariffStructure>,
    pub current_provider: Option<String>,
}

/// Map an invoice tariff label to a structure
pub fn parse_tariff_label(label: &str) -> Option<TariffStructure> {
    let folded = fold_text(label);
    let folded = folded.trim();
    match folded {
        "1" => return Some(TariffStructure::Simple),
        "2" => return Some(TariffStructure::BiHourly),
        "3" => return Some(TariffStructure::TriHourly),
        _ => {}
    }
    if folded.contains("tri") {
        Some(TariffStructure::TriHourly)
    } else if folded.contains("bi") {
        Some(TariffStructure::BiHourly)
    } else if folded.contains("simples") || folded.contains("simple") {
        Some(TariffStructure::Simple)
    } else {
        None
    }
}

fn check_power(power_kva: f64) -> Result<f64, ProfileError> {
    if power_kva.is_finite() && power_kva > 0.0 {
        Ok(power_kva)
    } else {
        Err(ProfileError::InvalidPower(power_kva))
    }
}

fn check_consumption(consumption_kwh: f64) -> Result<f64, ProfileError> {
    if consumption_kwh.is_finite() && consumption_kwh >= 0.0 {
        Ok(consumption_kwh)
    } else {
        Err(ProfileError::InvalidConsumption(consumption_kwh))
    }
}

/// Resolve a profile. Bill profiles go through the estimator, calibrated
/// against `catalog` when one is given.
pub fn resolve(
    profile: &ConsumptionProfile,
    catalog: Option<&[Offer]>,
    config: &PricingConfig,
) -> Result<ResolvedProfile, ProfileError> {
    match profile {
        ConsumptionProfile::Bill {
            monthly_bill,
            power_kva,
        } => {
            if !monthly_bill.is_finite() || *monthly_bill <= 0.0 {
                return Err(ProfileError::InvalidBill(*monthly_bill));
            }
            Ok(ResolvedProfile {
                consumption_kwh: estimate_consumption(*monthly_bill, catalog, config),
                power_kva: check_power(power_kva.unwrap_or(config.default_power_kva))?,
                current_tariff: None,
                current_provider: None,
            })
        }
        ConsumptionProfile::Manual {
            consumption_kwh,
            power_kva,
            tariff,
        } => Ok(ResolvedProfile {
            consumption_kwh: check_consumption(*consumption_kwh)?,
            power_kva: check_power(*power_kva)?,
            current_tariff: *tariff,
            current_provider: None,
        }),
        ConsumptionProfile::Invoice(extract) => {
            let consumption = extract.consumption.ok_or(ProfileError::MissingConsumption)?;
            Ok(ResolvedProfile {
                consumption_kwh: check_consumption(consumption)?,
                power_kva: check_power(extract.power.unwrap_or(config.default_power_kva))?,
                current_tariff: extract.tariff_type.as_deref().and_then(parse_tariff_label),
                current_provider: extract
                    .provider
                    .as_ref()
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty()),
            })
        }
    }
}
