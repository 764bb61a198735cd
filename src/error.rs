use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Metric types not found: {}", join_ids(.ids))]
    MetricTypesNotFound { ids: Vec<i64> },

    #[error("Metrics backend unavailable for query `{query}`{}: {detail}", format_status(.status))]
    BackendUnavailable {
        query: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("Malformed backend response: {0}")]
    MalformedBackendResponse(String),

    #[error("Inconsistent result types: expected {expected}, found {found}")]
    InconsistentResultTypes { expected: String, found: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status {})", code),
        None => String::new(),
    }
}

impl GatewayError {
    /// Short stable label, used as the `errorType` field and as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "bad_data",
            GatewayError::MetricTypesNotFound { .. } => "not_found",
            GatewayError::BackendUnavailable { .. } => "unavailable",
            GatewayError::MalformedBackendResponse(_) => "bad_response",
            GatewayError::InconsistentResultTypes { .. } => "internal",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::Unauthorized(_) => "unauthorized",
            GatewayError::Database(_) => "internal",
            GatewayError::Serialization(_) => "internal",
            GatewayError::Config(_) => "internal",
            GatewayError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::MetricTypesNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::BackendUnavailable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::MalformedBackendResponse(_) => StatusCode::BAD_GATEWAY,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::InconsistentResultTypes { .. }
            | GatewayError::Database(_)
            | GatewayError::Serialization(_)
            | GatewayError::Config(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<duckdb::Error> for GatewayError {
    fn from(err: duckdb::Error) -> Self {
        GatewayError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "status": "error",
            "errorType": self.kind(),
            "error": self.to_string(),
        }));

        (self.status_code(), body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
