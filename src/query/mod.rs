//! The aggregation engine: metric ids in, one merged Prometheus-style
//! response out.

pub mod executor;
pub mod merger;
pub mod translator;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::metrics::{self, QueryTimer};
use crate::models::{MergedResponse, QueryRequest};
use crate::registry::MetricRegistry;
use crate::{GatewayError, Result};

pub use executor::FanOutExecutor;

#[derive(Clone)]
pub struct QueryService {
    registry: Arc<dyn MetricRegistry>,
    executor: FanOutExecutor,
}

impl QueryService {
    pub fn new(registry: Arc<dyn MetricRegistry>, executor: FanOutExecutor) -> Self {
        Self { registry, executor }
    }

    /// Resolves, fans out, and merges. Any failure aborts the whole call.
    pub async fn query(&self, request: QueryRequest) -> Result<MergedResponse> {
        let span = tracing::info_span!(
            "metrics_query",
            request_id = %Uuid::new_v4(),
            metric_ids = ?request.metric_ids,
            range = request.mode.is_range(),
            instance = request.instance_filter.as_deref().unwrap_or("(all)"),
        );

        let _timer = QueryTimer::new();
        let result = self.run(request).instrument(span).await;
        if let Err(e) = &result {
            metrics::record_query_failure(e.kind());
        }
        result
    }

    async fn run(&self, request: QueryRequest) -> Result<MergedResponse> {
        let started = Instant::now();

        if request.metric_ids.is_empty() {
            warn!("Query called with no metric ids");
            return Err(GatewayError::InvalidRequest(
                "At least one metric id must be provided".to_string(),
            ));
        }
        info!("Starting metrics query");

        let resolved = self.registry.resolve(&request.metric_ids).await?;
        debug!("Found {} metric types in registry", resolved.len());

        let queries = translator::translate(&request, &resolved, Utc::now())?;
        debug!(
            "Built {} backend queries: [{}]",
            queries.len(),
            queries
                .iter()
                .map(|q| q.expr.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let results = self.executor.execute(&queries).await?;
        info!("All {} backend queries completed", results.len());

        let unit = match request.metric_ids.as_slice() {
            [id] => resolved
                .get(id)
                .and_then(|mt| mt.display_unit())
                .map(str::to_string),
            _ => None,
        };

        let merged = merger::merge(&results, &request.mode, unit)?;
        info!(
            "Metrics query completed - TotalDuration: {}ms, ResultCount: {}",
            started.elapsed().as_millis(),
            merged.data.result.len()
        );
        Ok(merged)
    }
}
