pub mod calculator;
pub mod config;
pub mod estimator;
pub mod profile;
pub mod selector;

pub use calculator::{annual_effective_cost, calculate_monthly_cost, cost_breakdown, CostBreakdown};
pub use config::{Distribution, PricingConfig};
pub use estimator::{calibrate, estimate_consumption, Calibration};
pub use profile::{resolve, ConsumptionProfile, InvoiceExtract, ResolvedProfile};
pub use selector::{compare, find_best, find_best_simple, rank_offers, Comparison, RankedOffer};
