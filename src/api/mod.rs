pub mod metric_types;
pub mod query;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::query::{FanOutExecutor, QueryService};
use crate::registry::{DuckDbMetricRegistry, MetricRegistry};
use crate::{metrics, GatewayError, Result};

#[derive(Clone)]
pub struct AppState {
    pub query: QueryService,
    pub registry: Arc<dyn MetricRegistry>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the registry and a backend executor built from `config`.
    pub fn new(config: Config, registry: Arc<dyn MetricRegistry>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.query_timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        let executor = FanOutExecutor::new(
            client,
            config.prometheus_url.clone(),
            config.query_timeout,
        );

        Ok(Self {
            query: QueryService::new(registry.clone(), executor),
            registry,
            config: Arc::new(config),
        })
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/metrics/query", post(query::query_metrics))
        .route(
            "/api/metrics/metrics",
            get(metric_types::list_metric_types).post(metric_types::create_metric_type),
        )
        .route(
            "/api/metrics/metrics/:id",
            put(metric_types::update_metric_type).delete(metric_types::delete_metric_type),
        )
        .route("/metrics", get(handle_metrics));

    let protected = if state.config.api_key.is_some() {
        protected.layer(middleware::from_fn_with_state(state.clone(), require_api_key))
    } else {
        protected
    };

    Router::new()
        .route("/api/health", get(handle_health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.config.api_key.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(state.config.api_key_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let rejection = match provided {
        None => Some("API key missing"),
        Some(key) if key != expected => Some("Invalid API key"),
        Some(_) => None,
    };

    match rejection {
        Some(reason) => GatewayError::Unauthorized(reason.to_string()).into_response(),
        None => next.run(request).await,
    }
}

async fn handle_health() -> &'static str {
    "Ok"
}

async fn handle_metrics() -> String {
    metrics::encode()
}

/// Opens the metric-type store, builds the app and serves until shutdown.
pub async fn start_gateway(config: Config) -> Result<()> {
    let registry: Arc<dyn MetricRegistry> = match config.database_path.as_deref() {
        Some(path) => Arc::new(DuckDbMetricRegistry::open(path)?),
        None => {
            info!("No DATABASE_PATH set, keeping metric types in memory");
            Arc::new(DuckDbMetricRegistry::open_in_memory()?)
        }
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(
        "Metrics backend: {}, sub-query timeout: {:?}",
        config.prometheus_url, config.query_timeout
    );

    let app = router(AppState::new(config, registry)?);

    info!("Starting metrics gateway on {}", addr);
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        GatewayError::Internal(format!("Failed to bind to address: {}", e))
    })?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GatewayError::Internal(format!("Server error: {}", e)))?;

    info!("Server shut down gracefully");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown"),
    }
}
