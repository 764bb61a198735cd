use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use super::AppState;
use crate::models::{MergedResponse, QueryMode, QueryRequest};
use crate::{GatewayError, Result};

/// Metric ids as clients send them: `[1, 2]`, `"1,2"` or `3`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MetricIds {
    List(Vec<i64>),
    Joined(String),
    Single(i64),
}

/// Timestamps as clients send them. Offset-less values are read as UTC.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum WireTime {
    Rfc3339(DateTime<Utc>),
    Naive(NaiveDateTime),
    UnixSeconds(i64),
}

impl WireTime {
    fn into_utc(self) -> Result<DateTime<Utc>> {
        match self {
            WireTime::Rfc3339(t) => Ok(t),
            WireTime::Naive(t) => Ok(Utc.from_utc_datetime(&t)),
            WireTime::UnixSeconds(secs) => Utc
                .timestamp_opt(secs, 0)
                .single()
                .ok_or_else(|| GatewayError::InvalidRequest(format!("timestamp {} out of range", secs))),
        }
    }
}

/// Wire body of `POST /api/metrics/query`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPayload {
    pub metric_ids: Option<MetricIds>,
    /// Legacy single-metric field.
    pub metric_id: Option<i64>,
    pub time: Option<WireTime>,
    #[serde(alias = "startTime")]
    pub start: Option<WireTime>,
    #[serde(alias = "endTime")]
    pub end: Option<WireTime>,
    pub step: Option<String>,
    #[serde(default)]
    pub is_range: bool,
    pub instance: Option<String>,
}

fn parse_joined(joined: &str) -> Result<Vec<i64>> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| GatewayError::InvalidRequest(format!("invalid metric id `{}`", s)))
        })
        .collect()
}

impl TryFrom<QueryPayload> for QueryRequest {
    type Error = GatewayError;

    fn try_from(payload: QueryPayload) -> Result<Self> {
        let mut ids = match payload.metric_ids {
            Some(MetricIds::List(ids)) => ids,
            Some(MetricIds::Joined(joined)) => parse_joined(&joined)?,
            Some(MetricIds::Single(id)) => vec![id],
            None => Vec::new(),
        };
        ids.extend(payload.metric_id);

        let mut metric_ids = Vec::with_capacity(ids.len());
        for id in ids {
            if !metric_ids.contains(&id) {
                metric_ids.push(id);
            }
        }
        if metric_ids.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "At least one metric id must be provided in metricIds".to_string(),
            ));
        }

        let mode = if payload.is_range {
            let start = payload.start.map(WireTime::into_utc).transpose()?;
            let end = payload.end.map(WireTime::into_utc).transpose()?;
            if let (Some(start), Some(end)) = (start, end) {
                if start > end {
                    return Err(GatewayError::InvalidRequest(format!(
                        "range start {} is after end {}",
                        start.to_rfc3339(),
                        end.to_rfc3339()
                    )));
                }
            }
            QueryMode::Range {
                start,
                end,
                step: payload.step,
            }
        } else {
            QueryMode::Instant {
                time: payload.time.map(WireTime::into_utc).transpose()?,
            }
        };

        let instance_filter = payload
            .instance
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty());

        Ok(QueryRequest {
            metric_ids,
            mode,
            instance_filter,
        })
    }
}

pub async fn query_metrics(
    State(state): State<AppState>,
    payload: std::result::Result<Json<QueryPayload>, JsonRejection>,
) -> Result<Json<MergedResponse>> {
    let Json(payload) =
        payload.map_err(|e| GatewayError::InvalidRequest(format!("Failed to parse body: {}", e)))?;
    let request = QueryRequest::try_from(payload)?;
    Ok(Json(state.query.query(request).await?))
}
