use std::time::{Duration, Instant};

use futures::future::try_join_all;
use reqwest::{Client, Url};
use tracing::{debug, error};

use crate::metrics;
use crate::models::{BackendQuery, BackendResult};
use crate::{GatewayError, Result};

/// Runs backend sub-queries concurrently against one Prometheus-compatible
/// base URL. The underlying `Client` is a shared connection pool.
#[derive(Debug, Clone)]
pub struct FanOutExecutor {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl FanOutExecutor {
    pub fn new(client: Client, base_url: Url, timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            timeout,
        }
    }

    /// Executes every query and returns the bodies index-aligned with
    /// `queries`. The first failure cancels the remaining requests.
    pub async fn execute(&self, queries: &[BackendQuery]) -> Result<Vec<BackendResult>> {
        try_join_all(queries.iter().map(|query| self.execute_one(query))).await
    }

    async fn execute_one(&self, query: &BackendQuery) -> Result<BackendResult> {
        let url = query.url(&self.base_url)?;
        debug!("Sending request to metrics backend: {}", url);

        let start = Instant::now();
        let response = match self.client.get(url).timeout(self.timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                let elapsed = start.elapsed();
                metrics::record_backend_request("transport_error", elapsed.as_secs_f64());
                let detail = if e.is_timeout() {
                    format!("timed out after {:?}", self.timeout)
                } else {
                    e.to_string()
                };
                error!(
                    "Backend request failed after {}ms - Query: {}, Target: {}, Error: {}",
                    elapsed.as_millis(),
                    query.expr,
                    self.base_url,
                    detail
                );
                return Err(GatewayError::BackendUnavailable {
                    query: query.expr.clone(),
                    status: None,
                    detail,
                });
            }
        };

        let status = response.status();
        let body = response.text().await.map_err(|e| GatewayError::BackendUnavailable {
            query: query.expr.clone(),
            status: Some(status.as_u16()),
            detail: format!("failed to read response body: {}", e),
        })?;
        let elapsed = start.elapsed();

        if !status.is_success() {
            metrics::record_backend_request("http_error", elapsed.as_secs_f64());
            error!(
                "Backend query failed - Status: {}, Duration: {}ms, Query: {}, Response: {}",
                status.as_u16(),
                elapsed.as_millis(),
                query.expr,
                body
            );
            return Err(GatewayError::BackendUnavailable {
                query: query.expr.clone(),
                status: Some(status.as_u16()),
                detail: body,
            });
        }

        metrics::record_backend_request("success", elapsed.as_secs_f64());
        debug!(
            "Backend query succeeded - Duration: {}ms, Query: {}",
            elapsed.as_millis(),
            query.expr
        );

        Ok(BackendResult {
            status: status.as_u16(),
            body,
        })
    }
}
