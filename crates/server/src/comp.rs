use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
    routing::post,
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use wincomp_core::{
    parse_ids, recompute_batch, ApplicationError, BatchMode, CompBreakdown,
    DeterministicCompensationEngine, RecomputeOutcome, RecomputeStatus, WonServiceId,
};
use wincomp_dataverse::{DataverseWonServiceStore, ForwardedToken};

use crate::api::{bearer_token, correlation_id, ApiError, ApiState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecomputeRequest {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    isolate_failures: bool,
}

#[derive(Debug, Serialize)]
pub struct RecomputeResponse {
    pub message: String,
    pub results: Vec<OutcomeBody>,
}

/// Wire form of a [`RecomputeOutcome`]; amounts go out as JSON numbers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeBody {
    pub id: WonServiceId,
    pub status: RecomputeStatus,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub expected_comp: Option<Decimal>,
    pub breakdown: Option<BreakdownBody>,
    pub service_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BreakdownBody {
    #[serde(rename = "existingMRR", with = "rust_decimal::serde::float")]
    pub existing_mrr: Decimal,
    #[serde(rename = "existingTCV", with = "rust_decimal::serde::float")]
    pub existing_tcv: Decimal,
    #[serde(rename = "existingRate", with = "rust_decimal::serde::float")]
    pub existing_rate: Decimal,
    #[serde(rename = "existingComp", with = "rust_decimal::serde::float")]
    pub existing_comp: Decimal,
    #[serde(rename = "newMRR", with = "rust_decimal::serde::float_option")]
    pub new_mrr: Option<Decimal>,
    #[serde(rename = "newTCV", with = "rust_decimal::serde::float_option")]
    pub new_tcv: Option<Decimal>,
    #[serde(rename = "newRate", with = "rust_decimal::serde::float_option")]
    pub new_rate: Option<Decimal>,
    #[serde(rename = "newComp", with = "rust_decimal::serde::float_option")]
    pub new_comp: Option<Decimal>,
    #[serde(rename = "totalComp", with = "rust_decimal::serde::float")]
    pub total_comp: Decimal,
    pub explanation: String,
}

impl From<RecomputeOutcome> for OutcomeBody {
    fn from(outcome: RecomputeOutcome) -> Self {
        Self {
            id: outcome.id,
            status: outcome.status,
            expected_comp: outcome.expected_comp,
            breakdown: outcome.breakdown.map(BreakdownBody::from),
            service_data: outcome.service_data,
            error: outcome.error,
        }
    }
}

impl From<CompBreakdown> for BreakdownBody {
    fn from(breakdown: CompBreakdown) -> Self {
        Self {
            existing_mrr: breakdown.existing_mrr,
            existing_tcv: breakdown.existing_tcv,
            existing_rate: breakdown.existing_rate,
            existing_comp: breakdown.existing_comp,
            new_mrr: breakdown.new_mrr,
            new_tcv: breakdown.new_tcv,
            new_rate: breakdown.new_rate,
            new_comp: breakdown.new_comp,
            total_comp: breakdown.total_comp,
            explanation: breakdown.explanation,
        }
    }
}

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/api/v1/won-services/comp", post(recompute_many))
        .route("/api/v1/won-services/{id}/comp", post(recompute_single))
}

async fn recompute_many(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RecomputeResponse>, ApiError> {
    let correlation_id = correlation_id();

    let request: RecomputeRequest = serde_json::from_slice(&body).map_err(|error| {
        ApiError::bad_request(format!("invalid request body: {error}"), &correlation_id)
    })?;
    let ids = parse_ids(&request.ids)
        .map_err(|error| ApiError::from_application(error.into(), &correlation_id))?;
    let token = bearer_token(&headers, &correlation_id)?;

    let mode = if request.isolate_failures { BatchMode::Isolated } else { BatchMode::FailFast };
    run(&state, token, &ids, mode, &correlation_id).await.map(Json)
}

async fn recompute_single(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RecomputeResponse>, ApiError> {
    let correlation_id = correlation_id();

    let ids = parse_ids(&[id])
        .map_err(|error| ApiError::from_application(error.into(), &correlation_id))?;
    let token = bearer_token(&headers, &correlation_id)?;

    run(&state, token, &ids, BatchMode::FailFast, &correlation_id).await.map(Json)
}

async fn run(
    state: &ApiState,
    token: ForwardedToken,
    ids: &[WonServiceId],
    mode: BatchMode,
    correlation_id: &str,
) -> Result<RecomputeResponse, ApiError> {
    info!(
        event_name = "api.comp.recompute.start",
        correlation_id,
        requested = ids.len(),
        mode = ?mode,
        "recomputing won service compensation"
    );

    let store = DataverseWonServiceStore::new(
        state.dataverse(token),
        state.config().dataverse.won_service_entity_set.clone(),
    );
    let results = recompute_batch(&store, &DeterministicCompensationEngine, ids, mode)
        .await
        .map_err(|error| {
            ApiError::from_application(ApplicationError::from(error.source), correlation_id)
        })?;

    let updated =
        results.iter().filter(|outcome| outcome.status == RecomputeStatus::Updated).count();
    info!(
        event_name = "api.comp.recompute.finished",
        correlation_id,
        updated,
        failed = results.len() - updated,
        "won service compensation recomputed"
    );

    Ok(RecomputeResponse {
        message: summary(updated, results.len()),
        results: results.into_iter().map(OutcomeBody::from).collect(),
    })
}

fn summary(updated: usize, total: usize) -> String {
    if updated == total {
        format!("Updated expected compensation for {total} won service(s)")
    } else {
        format!("Updated expected compensation for {updated} of {total} won service(s)")
    }
}
