use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// A logical metric as stored by the registry. Each entry in
/// `backend_identifiers` is one physical Prometheus series selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricType {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub backend_identifiers: Vec<String>,
    pub unit: Option<String>,
    pub soft_deleted: bool,
    pub created_by: Option<i64>,
    pub created_at: i64,
    pub updated_by: Option<i64>,
    pub updated_at: Option<i64>,
}

impl MetricType {
    /// Trimmed, non-blank identifiers in declaration order.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.backend_identifiers
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
    }

    /// The display unit, if one is declared and not blank.
    pub fn display_unit(&self) -> Option<&str> {
        self.unit.as_deref().filter(|u| !u.trim().is_empty())
    }
}

/// Payload for creating or replacing a metric type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMetricType {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub backend_identifiers: Vec<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl NewMetricType {
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::GatewayError::InvalidRequest(
                "metric type name must not be blank".to_string(),
            ));
        }
        if self.backend_identifiers.iter().all(|id| id.trim().is_empty()) {
            return Err(crate::GatewayError::InvalidRequest(
                "metric type needs at least one backend identifier".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryMode {
    Instant {
        time: Option<DateTime<Utc>>,
    },
    Range {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        step: Option<String>,
    },
}

impl QueryMode {
    pub fn is_range(&self) -> bool {
        matches!(self, QueryMode::Range { .. })
    }

    /// Result type reported when no backend response supplied one.
    pub fn default_result_type(&self) -> &'static str {
        match self {
            QueryMode::Instant { .. } => "vector",
            QueryMode::Range { .. } => "matrix",
        }
    }
}

/// A normalized query as handed to the query service by the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Requested metric ids in caller order, without duplicates.
    pub metric_ids: Vec<i64>,
    pub mode: QueryMode,
    pub instance_filter: Option<String>,
}

/// Time parameters with all defaults applied, as Unix epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeParams {
    Instant { time: i64 },
    Range { start: i64, end: i64, step: String },
}

/// One executable sub-query against the metrics backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendQuery {
    /// The PromQL expression, e.g. `cpu_pct{instance="node1"}`.
    pub expr: String,
    pub time: TimeParams,
}

impl BackendQuery {
    pub fn path(&self) -> &'static str {
        match self.time {
            TimeParams::Instant { .. } => "api/v1/query",
            TimeParams::Range { .. } => "api/v1/query_range",
        }
    }

    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("query", self.expr.clone())];
        match &self.time {
            TimeParams::Instant { time } => params.push(("time", time.to_string())),
            TimeParams::Range { start, end, step } => {
                params.push(("start", start.to_string()));
                params.push(("end", end.to_string()));
                params.push(("step", step.clone()));
            }
        }
        params
    }

    /// Full request URL under `base`, with percent-encoded parameters.
    pub fn url(&self, base: &reqwest::Url) -> crate::Result<reqwest::Url> {
        let mut url = base.join(self.path()).map_err(|e| {
            crate::GatewayError::Internal(format!("Failed to build backend URL: {}", e))
        })?;
        url.query_pairs_mut().extend_pairs(self.params());
        Ok(url)
    }
}

/// Raw response of one backend sub-query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendResult {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergedData {
    #[serde(rename = "resultType")]
    pub result_type: String,
    pub result: Vec<Box<RawValue>>,
}

/// The aggregated response returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct MergedResponse {
    pub status: &'static str,
    pub data: MergedData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl MergedResponse {
    pub fn success(result_type: String, result: Vec<Box<RawValue>>, unit: Option<String>) -> Self {
        Self {
            status: "success",
            data: MergedData {
                result_type,
                result,
            },
            unit,
        }
    }
}
