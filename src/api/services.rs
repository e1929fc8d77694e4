use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use http_body_util::{BodyExt, Limited};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{
    error::ApiError,
    models::{CallbackResponse, HealthResponse},
    state::AppState,
};
use crate::dispatch::{StatusReport, StatusUpdate, apply_status};
use crate::ledger::PolicyStore;
use crate::model::DeliveryKind;

/// Status hook endpoint (POST /service/notifications/jobs/{kind}/{id})
///
/// Job runners report progress here for the record identified by the path.
/// The body is a JSON [`StatusReport`]. Reports that arrive out of order or
/// carry a foreign correlation id are acknowledged but not applied.
pub async fn status_hook(
    State(state): State<AppState>,
    Path((kind, record_id)): Path<(String, u64)>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let kind = DeliveryKind::from_hook_segment(&kind)
        .ok_or_else(|| ApiError::NotFound(format!("status hook kind '{}'", kind)))?;

    super::utils::require_json(&headers)?;
    let body_bytes = read_body(body, state.max_callback_bytes()).await?;
    let report: StatusReport = serde_json::from_slice(&body_bytes)?;

    let update = apply_status(state.store.as_ref(), kind, record_id, &report)?;
    match update {
        StatusUpdate::Applied { status, .. } => {
            state.metrics.callback_applied();
            info!(record_id, %status, job_id = %report.job_id, "Status hook applied");
        }
        StatusUpdate::Ignored { reason, .. } => {
            state.metrics.callback_ignored();
            debug!(record_id, ?reason, job_id = %report.job_id, "Status hook ignored");
        }
    }

    Ok((StatusCode::OK, Json(CallbackResponse::from(update))))
}

/// Buffer at most `max_size` bytes of the (decoded) body.
async fn read_body(body: axum::body::Body, max_size: usize) -> Result<Vec<u8>, ApiError> {
    let data = Limited::new(body, max_size)
        .collect()
        .await
        .map_err(|err| super::utils::body_read_error(err, max_size))?
        .to_bytes()
        .to_vec();
    Ok(data)
}

/// Delivery record view (GET /deliveries/{id})
pub async fn get_delivery(
    State(state): State<AppState>,
    Path(record_id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .store
        .get_delivery_record(record_id)?
        .ok_or_else(|| ApiError::NotFound(format!("delivery record {record_id}")))?;

    Ok((StatusCode::OK, Json(record)))
}

/// Policy view with target secrets stripped (GET /policies/{id})
pub async fn get_policy(
    State(state): State<AppState>,
    Path(policy_id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let policy = state
        .store
        .get_policy(policy_id)?
        .ok_or_else(|| ApiError::NotFound(format!("policy {policy_id}")))?;

    Ok((StatusCode::OK, Json(policy.redacted())))
}

/// Delivery history of one policy (GET /policies/{id}/deliveries)
pub async fn list_policy_deliveries(
    State(state): State<AppState>,
    Path(policy_id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    if state.store.get_policy(policy_id)?.is_none() {
        return Err(ApiError::NotFound(format!("policy {policy_id}")));
    }
    let records = state.store.list_delivery_records(policy_id)?;
    Ok((StatusCode::OK, Json(records)))
}

/// Counter snapshot (GET /metrics)
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Health check endpoint (GET /health)
///
/// Reports the ledger and, for the in-process runner, the worker pool.
/// Returns 503 Service Unavailable if any component is unhealthy.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = BTreeMap::new();

    components.insert("api".to_string(), "healthy".to_string());
    let ledger = if state.store.last_prune().is_ok() {
        "healthy"
    } else {
        "unhealthy"
    };
    components.insert("ledger".to_string(), ledger.to_string());

    let runner = match &state.local_runner {
        Some(runner) if runner.health_check() => "healthy",
        Some(_) => "unhealthy",
        None => "remote",
    };
    components.insert("runner".to_string(), runner.to_string());

    let all_healthy = components.values().all(|status| status != "unhealthy");
    let (overall_status, status_code) = if all_healthy {
        ("healthy", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}
