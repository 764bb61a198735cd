use serde::Deserialize;
use serde_json::value::RawValue;

use crate::models::{BackendResult, MergedResponse, QueryMode};
use crate::{GatewayError, Result};

/// The part of a Prometheus API response the merger relies on.
#[derive(Debug, Deserialize)]
struct BackendEnvelope {
    data: Option<BackendData>,
}

#[derive(Debug, Deserialize)]
struct BackendData {
    #[serde(rename = "resultType")]
    result_type: Option<String>,
    result: Option<Vec<Box<RawValue>>>,
}

/// Typed view of one successful sub-response.
#[derive(Debug)]
struct SubResult {
    result_type: String,
    items: Vec<Box<RawValue>>,
}

fn parse(index: usize, result: &BackendResult) -> Result<SubResult> {
    let envelope: BackendEnvelope = serde_json::from_str(&result.body).map_err(|e| {
        GatewayError::MalformedBackendResponse(format!("sub-query {}: {}", index, e))
    })?;

    let data = envelope.data.ok_or_else(|| {
        GatewayError::MalformedBackendResponse(format!("sub-query {}: missing `data`", index))
    })?;
    let items = data.result.ok_or_else(|| {
        GatewayError::MalformedBackendResponse(format!(
            "sub-query {}: missing `data.result`",
            index
        ))
    })?;
    let result_type = data.result_type.ok_or_else(|| {
        GatewayError::MalformedBackendResponse(format!(
            "sub-query {}: missing `data.resultType`",
            index
        ))
    })?;

    Ok(SubResult { result_type, items })
}

/// Combines the sub-responses, in order, into one response envelope.
///
/// All sub-responses must agree on `resultType`. `unit` is attached as given;
/// deciding whether a unit applies is left to the caller.
pub fn merge(
    results: &[BackendResult],
    mode: &QueryMode,
    unit: Option<String>,
) -> Result<MergedResponse> {
    let mut result_type: Option<String> = None;
    let mut merged = Vec::new();

    for (index, result) in results.iter().enumerate() {
        let sub = parse(index, result)?;

        match &result_type {
            None => result_type = Some(sub.result_type),
            Some(expected) if *expected != sub.result_type => {
                return Err(GatewayError::InconsistentResultTypes {
                    expected: expected.clone(),
                    found: sub.result_type,
                });
            }
            Some(_) => {}
        }

        merged.extend(sub.items);
    }

    let result_type = result_type.unwrap_or_else(|| mode.default_result_type().to_string());
    Ok(MergedResponse::success(result_type, merged, unit))
}
