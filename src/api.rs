//! HTTP surface over the pricing engine. Handlers only read the loaded
//! snapshot; a rebuilt catalog takes effect on server restart.

use crate::error::{ProfileError, SelectionError};
use crate::ingestion::types::{BuildSummary, TariffStructure};
use crate::ingestion::write::LoadedCatalog;
use crate::pricing::calculator::{annual_effective_cost, cost_breakdown, CostBreakdown};
use crate::pricing::config::{Distribution, PricingConfig};
use crate::pricing::estimator::{calibrate, estimate_with, Calibration};
use crate::pricing::profile::{resolve, ConsumptionProfile, ResolvedProfile};
use crate::pricing::selector::{compare, find_best};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<LoadedCatalog>,
    pub pricing: Arc<PricingConfig>,
}

impl AppState {
    pub fn new(catalog: LoadedCatalog, pricing: PricingConfig) -> Self {
        AppState {
            catalog: Arc::new(catalog),
            pricing: Arc::new(pricing),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/api/health", get(health_check))
        .route("/api/catalog", get(catalog_info))
        .route("/api/best", post(best_offer))
        .route("/api/cost", post(offer_cost))
        .route("/api/estimate", post(estimate))
        .route("/api/compare", post(compare_profile))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error("offer {provider}/{proposal} not found at {power_kva} kVA / tariff {tariff}")]
    OfferNotFound {
        provider: String,
        proposal: String,
        power_kva: f64,
        tariff: TariffStructure,
    },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        warn!("Request failed: {}", message);
        let (status, body) = match &self {
            ApiError::Selection(
                SelectionError::NoValidOffer { power_kva, tariff }
                | SelectionError::NoOfferWithValidCost { power_kva, tariff },
            ) => (
                StatusCode::NOT_FOUND,
                json!({ "error": message, "powerKva": power_kva, "tariff": tariff }),
            ),
            ApiError::Selection(SelectionError::ImplausibleCost { cost }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": message, "monthlyCost": cost }),
            ),
            ApiError::Profile(_) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            ApiError::OfferNotFound {
                provider,
                proposal,
                power_kva,
                tariff,
            } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": message,
                    "provider": provider,
                    "proposal": proposal,
                    "powerKva": power_kva,
                    "tariff": tariff,
                }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub message: String,
    pub status: String,
    pub offers: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        message: "Tariff API is running!".to_string(),
        status: "ok".to_string(),
        offers: state.catalog.offers.len(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogInfo<'a> {
    offers_count: usize,
    build: Option<&'a BuildSummary>,
}

async fn catalog_info(State(state): State<AppState>) -> Response {
    Json(CatalogInfo {
        offers_count: state.catalog.offers.len(),
        build: state.catalog.metadata.as_ref().map(|m| &m.build),
    })
    .into_response()
}

fn default_tariff() -> TariffStructure {
    TariffStructure::Simple
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestRequest {
    pub consumption_kwh: f64,
    pub power_kva: f64,
    #[serde(default = "default_tariff")]
    pub tariff: TariffStructure,
    pub distribution: Option<Distribution>,
}

async fn best_offer(
    State(state): State<AppState>,
    Json(req): Json<BestRequest>,
) -> Result<Response, ApiError> {
    let best = find_best(
        &state.catalog.offers,
        req.consumption_kwh,
        req.power_kva,
        req.tariff,
        req.distribution.as_ref(),
        &state.pricing,
    )?;
    Ok(Json(best).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostRequest {
    pub provider: String,
    pub proposal: String,
    pub power_kva: f64,
    #[serde(default = "default_tariff")]
    pub tariff: TariffStructure,
    pub consumption_kwh: f64,
    pub distribution: Option<Distribution>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CostResponse {
    provider: String,
    proposal: String,
    breakdown: CostBreakdown,
    monthly_cost: f64,
    annual_cost_effective: f64,
}

async fn offer_cost(
    State(state): State<AppState>,
    Json(req): Json<CostRequest>,
) -> Result<Json<CostResponse>, ApiError> {
    let offer = state
        .catalog
        .offers
        .iter()
        .find(|o| {
            o.provider == req.provider
                && o.proposal == req.proposal
                && o.tariff == req.tariff
                && o.matches_power(req.power_kva)
        })
        .ok_or_else(|| ApiError::OfferNotFound {
            provider: req.provider.clone(),
            proposal: req.proposal.clone(),
            power_kva: req.power_kva,
            tariff: req.tariff,
        })?;

    let distribution = req.distribution.as_ref();
    let breakdown = cost_breakdown(
        offer,
        req.consumption_kwh,
        req.power_kva,
        distribution,
        &state.pricing,
    );

    Ok(Json(CostResponse {
        provider: offer.provider.clone(),
        proposal: offer.proposal.clone(),
        monthly_cost: breakdown.total,
        annual_cost_effective: annual_effective_cost(
            offer,
            req.consumption_kwh,
            req.power_kva,
            distribution,
            &state.pricing,
        ),
        breakdown,
    }))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateRequest {
    pub monthly_bill: f64,
    /// Use catalog medians instead of the configured constants
    #[serde(default = "default_true")]
    pub calibrate: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EstimateResponse {
    consumption_kwh: f64,
    calibration: Calibration,
}

async fn estimate(
    State(state): State<AppState>,
    Json(req): Json<EstimateRequest>,
) -> Json<EstimateResponse> {
    let calibration = if req.calibrate {
        calibrate(&state.catalog.offers, &state.pricing)
    } else {
        Calibration::defaults(&state.pricing)
    };
    Json(EstimateResponse {
        consumption_kwh: estimate_with(req.monthly_bill, &calibration, &state.pricing),
        calibration,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareRequest {
    pub profile: ConsumptionProfile,
    pub current_monthly_spend: Option<f64>,
    pub distribution: Option<Distribution>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompareResponse<'a, T: Serialize> {
    profile: &'a ResolvedProfile,
    #[serde(flatten)]
    comparison: T,
}

async fn compare_profile(
    State(state): State<AppState>,
    Json(req): Json<CompareRequest>,
) -> Result<Response, ApiError> {
    let offers = &state.catalog.offers;
    let profile = resolve(&req.profile, Some(offers.as_slice()), &state.pricing)?;

    // Bill-only profiles have no separate spend figure; the bill is the spend
    let spend = req.current_monthly_spend.or(match &req.profile {
        ConsumptionProfile::Bill { monthly_bill, .. } => Some(*monthly_bill),
        _ => None,
    });

    let comparison = compare(
        offers,
        &profile,
        spend,
        req.distribution.as_ref(),
        &state.pricing,
    )?;

    Ok(Json(CompareResponse {
        profile: &profile,
        comparison,
    })
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::calculator::tests::offer;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        let mut cheap = offer(1, 0.20, 0.14);
        cheap.provider = "GALP".to_string();
        cheap.proposal = "G1".to_string();
        cheap.tariff_name = Some("Galp Casa".to_string());

        let mut locked = offer(1, 0.10, 0.05);
        locked.provider = "LCK".to_string();
        locked.has_lock_in = true;

        let catalog = LoadedCatalog {
            offers: vec![offer(1, 0.25, 0.16), cheap, locked],
            metadata: None,
        };
        router(AppState::new(catalog, PricingConfig::default()))
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(json) => Body::from(json.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(app(), "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["offers"], 3);
    }

    #[tokio::test]
    async fn test_catalog_without_metadata() {
        let (status, body) = send(app(), "GET", "/api/catalog", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["offersCount"], 3);
        assert!(body["build"].is_null());
    }

    #[tokio::test]
    async fn test_best_offer() {
        let (status, body) = send(
            app(),
            "POST",
            "/api/best",
            Some(json!({ "consumptionKwh": 250, "powerKva": 6.9, "tariff": 1 })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["COM"], "GALP");
        assert_eq!(body["hasLockIn"], false);
        assert!(body["monthlyCost"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_best_offer_not_found_names_filter() {
        let (status, body) = send(
            app(),
            "POST",
            "/api/best",
            Some(json!({ "consumptionKwh": 250, "powerKva": 99, "tariff": 1 })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["powerKva"], 99.0);
        assert_eq!(body["tariff"], 1);
    }

    #[tokio::test]
    async fn test_cost_breakdown() {
        let (status, body) = send(
            app(),
            "POST",
            "/api/cost",
            Some(json!({
                "provider": "EDP",
                "proposal": "P1",
                "powerKva": 6.9,
                "consumptionKwh": 250
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!((body["monthlyCost"].as_f64().unwrap() - 62.238).abs() < 1e-6);
        assert!((body["breakdown"]["fixedTerm"].as_f64().unwrap() - 7.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cost_unknown_offer() {
        let (status, body) = send(
            app(),
            "POST",
            "/api/cost",
            Some(json!({
                "provider": "NOPE",
                "proposal": "X",
                "powerKva": 6.9,
                "consumptionKwh": 250
            })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["provider"], "NOPE");
    }

    #[tokio::test]
    async fn test_estimate_bounds() {
        let (_, low) = send(
            app(),
            "POST",
            "/api/estimate",
            Some(json!({ "monthlyBill": 1 })),
        )
        .await;
        let (_, high) = send(
            app(),
            "POST",
            "/api/estimate",
            Some(json!({ "monthlyBill": 100000, "calibrate": false })),
        )
        .await;

        assert_eq!(low["consumptionKwh"], 50.0);
        assert_eq!(high["consumptionKwh"], 5000.0);
        assert_eq!(high["calibration"]["sampleSize"], 0);
    }

    #[tokio::test]
    async fn test_compare_manual_profile() {
        let (status, body) = send(
            app(),
            "POST",
            "/api/compare",
            Some(json!({
                "profile": { "kind": "manual", "consumptionKwh": 250, "powerKva": 6.9 },
                "currentMonthlySpend": 90
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["best"]["COM"], "GALP");
        assert_eq!(body["profile"]["consumptionKwh"], 250.0);
        let monthly = body["monthlySavings"].as_f64().unwrap();
        assert!((body["annualSavings"].as_f64().unwrap() - monthly * 12.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_compare_invalid_profile() {
        let (status, body) = send(
            app(),
            "POST",
            "/api/compare",
            Some(json!({ "profile": { "kind": "invoice", "provider": "EDP" } })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("consumption"));
    }
}
