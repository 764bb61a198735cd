use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::info;

use super::AppState;
use crate::models::{MetricType, NewMetricType};
use crate::{GatewayError, Result};

/// Header carrying the authenticated principal id, set by the auth proxy.
pub const ACTOR_HEADER: &str = "x-user-id";

fn actor(headers: &HeaderMap) -> Option<i64> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn body(payload: std::result::Result<Json<NewMetricType>, JsonRejection>) -> Result<NewMetricType> {
    payload
        .map(|Json(new)| new)
        .map_err(|e| GatewayError::InvalidRequest(format!("Failed to parse body: {}", e)))
}

pub async fn list_metric_types(State(state): State<AppState>) -> Result<Json<Vec<MetricType>>> {
    Ok(Json(state.registry.list().await?))
}

pub async fn create_metric_type(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<NewMetricType>, JsonRejection>,
) -> Result<(StatusCode, Json<MetricType>)> {
    let new = body(payload)?;
    info!("Creating metric type: {}", new.name);
    let created = state.registry.create(new, actor(&headers)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_metric_type(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    payload: std::result::Result<Json<NewMetricType>, JsonRejection>,
) -> Result<Json<MetricType>> {
    let new = body(payload)?;
    state
        .registry
        .update(id, new, actor(&headers))
        .await?
        .map(Json)
        .ok_or_else(|| GatewayError::NotFound(format!("Metric type with ID {} not found", id)))
}

pub async fn delete_metric_type(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    state.registry.soft_delete(id, actor(&headers)).await?;
    Ok(StatusCode::NO_CONTENT)
}
