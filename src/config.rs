use std::env;
use std::time::Duration;

use reqwest::Url;

use crate::{GatewayError, Result};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_PROMETHEUS_URL: &str = "http://localhost:9090";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_API_KEY_HEADER: &str = "X-Api-Key";
pub const DEFAULT_LOG_FILTER: &str = "metrics_gateway=info,tower_http=info";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Base URL of the Prometheus-compatible backend, always ending in `/`.
    pub prometheus_url: Url,
    pub query_timeout: Duration,
    /// `None` keeps the metric-type store in memory.
    pub database_path: Option<String>,
    pub api_key: Option<String>,
    pub api_key_header: String,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| GatewayError::Config(format!("PORT `{}`: {}", raw, e)))?,
            None => DEFAULT_PORT,
        };

        let prometheus_url = parse_base_url(
            &get("PROMETHEUS_URL").unwrap_or_else(|| DEFAULT_PROMETHEUS_URL.to_string()),
        )?;

        let query_timeout = match get("QUERY_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|e| {
                    GatewayError::Config(format!("QUERY_TIMEOUT_SECS `{}`: {}", raw, e))
                })?;
                if secs == 0 {
                    return Err(GatewayError::Config(
                        "QUERY_TIMEOUT_SECS must be greater than zero".to_string(),
                    ));
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        };

        Ok(Self {
            port,
            prometheus_url,
            query_timeout,
            database_path: get("DATABASE_PATH"),
            api_key: get("API_KEY"),
            api_key_header: get("API_KEY_HEADER")
                .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string()),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        })
    }
}

/// Parses an http(s) base URL and makes sure its path ends with `/` so that
/// relative API paths join beneath it.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| GatewayError::Config(format!("invalid backend URL `{}`: {}", raw, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(GatewayError::Config(format!(
            "backend URL `{}` must use http or https",
            raw
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
