use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::models::{BackendQuery, MetricType, QueryMode, QueryRequest, TimeParams};
use crate::{GatewayError, Result};

pub const DEFAULT_STEP: &str = "15s";

/// Applies the time defaults for `mode` relative to `now`.
pub fn resolve_time(mode: &QueryMode, now: DateTime<Utc>) -> TimeParams {
    match mode {
        QueryMode::Instant { time } => TimeParams::Instant {
            time: time.unwrap_or(now).timestamp(),
        },
        QueryMode::Range { start, end, step } => TimeParams::Range {
            start: start.unwrap_or(now - Duration::hours(1)).timestamp(),
            end: end.unwrap_or(now).timestamp(),
            step: step
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_STEP)
                .to_string(),
        },
    }
}

/// Appends the instance label selector to a raw identifier. The value is
/// inserted as-is.
pub fn apply_instance_filter(identifier: &str, instance: Option<&str>) -> String {
    match instance {
        Some(instance) => format!("{}{{instance=\"{}\"}}", identifier, instance),
        None => identifier.to_string(),
    }
}

/// Builds the backend sub-queries for `request`, in metric-id order and then
/// identifier order within each metric.
///
/// Every requested id must be present in `resolved` and carry at least one
/// non-blank identifier; otherwise all offending ids are reported together.
pub fn translate(
    request: &QueryRequest,
    resolved: &HashMap<i64, MetricType>,
    now: DateTime<Utc>,
) -> Result<Vec<BackendQuery>> {
    let missing: Vec<i64> = request
        .metric_ids
        .iter()
        .copied()
        .filter(|id| {
            resolved
                .get(id)
                .map_or(true, |mt| mt.identifiers().next().is_none())
        })
        .collect();
    if !missing.is_empty() {
        return Err(GatewayError::MetricTypesNotFound { ids: missing });
    }

    let time = resolve_time(&request.mode, now);
    let instance = request
        .instance_filter
        .as_deref()
        .filter(|i| !i.trim().is_empty());

    let queries = request
        .metric_ids
        .iter()
        .filter_map(|id| resolved.get(id))
        .flat_map(|mt| mt.identifiers())
        .map(|identifier| BackendQuery {
            expr: apply_instance_filter(identifier, instance),
            time: time.clone(),
        })
        .collect();

    Ok(queries)
}
