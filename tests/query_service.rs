use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use metrics_gateway::config::parse_base_url;
use metrics_gateway::models::{MetricType, NewMetricType, QueryMode, QueryRequest};
use metrics_gateway::query::{FanOutExecutor, QueryService};
use metrics_gateway::registry::{DuckDbMetricRegistry, MetricRegistry};
use metrics_gateway::GatewayError;

struct Harness {
    server: MockServer,
    registry: Arc<DuckDbMetricRegistry>,
    service: QueryService,
}

impl Harness {
    async fn start() -> Self {
        Self::with_timeout(Duration::from_secs(5)).await
    }

    async fn with_timeout(timeout: Duration) -> Self {
        let server = MockServer::start().await;
        let registry = Arc::new(DuckDbMetricRegistry::open_in_memory().unwrap());
        let executor = FanOutExecutor::new(
            reqwest::Client::new(),
            parse_base_url(&server.uri()).unwrap(),
            timeout,
        );
        let service = QueryService::new(registry.clone(), executor);
        Self {
            server,
            registry,
            service,
        }
    }

    async fn metric(&self, identifiers: &[&str], unit: Option<&str>) -> MetricType {
        self.registry
            .create(
                NewMetricType {
                    name: identifiers.join("+"),
                    description: String::new(),
                    backend_identifiers: identifiers.iter().map(|s| s.to_string()).collect(),
                    unit: unit.map(str::to_string),
                },
                None,
            )
            .await
            .unwrap()
    }

    async fn respond(&self, expr: &str, body: Value) {
        Mock::given(method("GET"))
            .and(query_param("query", expr))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    async fn received_queries(&self) -> Vec<Vec<(String, String)>> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|r| r.url.query_pairs().into_owned().collect())
            .collect()
    }
}

fn vector(items: Value) -> Value {
    json!({"status": "success", "data": {"resultType": "vector", "result": items}})
}

fn matrix(items: Value) -> Value {
    json!({"status": "success", "data": {"resultType": "matrix", "result": items}})
}

fn sample(name: &str, instance: &str) -> Value {
    json!({"metric": {"__name__": name, "instance": instance}, "value": [1700000000, "0.5"]})
}

fn instant(ids: Vec<i64>) -> QueryRequest {
    QueryRequest {
        metric_ids: ids,
        mode: QueryMode::Instant { time: None },
        instance_filter: None,
    }
}

fn param<'a>(pairs: &'a [(String, String)], key: &str) -> &'a str {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or_else(|| panic!("missing query parameter {}", key))
}

#[test_log::test(tokio::test)]
async fn single_metric_returns_backend_result_with_unit() {
    let h = Harness::start().await;
    let cpu = h.metric(&["cpu_pct"], Some("%")).await;
    let items = json!([sample("cpu_pct", "a"), sample("cpu_pct", "b")]);
    h.respond("cpu_pct", vector(items.clone())).await;

    let merged = h.service.query(instant(vec![cpu.id])).await.unwrap();

    assert_eq!(
        serde_json::to_value(&merged).unwrap(),
        json!({"status": "success", "data": {"resultType": "vector", "result": items}, "unit": "%"})
    );
}

#[tokio::test]
async fn single_metric_without_unit_has_no_unit() {
    let h = Harness::start().await;
    let up = h.metric(&["up"], None).await;
    h.respond("up", vector(json!([sample("up", "a")]))).await;

    let merged = h.service.query(instant(vec![up.id])).await.unwrap();

    let out = serde_json::to_value(&merged).unwrap();
    assert!(out.get("unit").is_none());
}

#[tokio::test]
async fn multiple_metrics_are_concatenated_in_request_order_without_unit() {
    let h = Harness::start().await;
    let cpu = h.metric(&["cpu_pct", "mem_pct"], Some("%")).await;
    let temp = h.metric(&["node_temp"], Some("C")).await;
    h.respond("cpu_pct", vector(json!([sample("cpu_pct", "a")]))).await;
    h.respond(
        "mem_pct",
        vector(json!([sample("mem_pct", "a"), sample("mem_pct", "b")])),
    )
    .await;
    h.respond("node_temp", vector(json!([sample("node_temp", "a")]))).await;

    let merged = h
        .service
        .query(instant(vec![temp.id, cpu.id]))
        .await
        .unwrap();

    let out = serde_json::to_value(&merged).unwrap();
    let names: Vec<&str> = out["data"]["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["metric"]["__name__"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["node_temp", "cpu_pct", "mem_pct", "mem_pct"]);
    assert!(out.get("unit").is_none());
}

#[tokio::test]
async fn instance_filter_applies_to_every_identifier_at_one_timestamp() {
    let h = Harness::start().await;
    let usage = h.metric(&["cpu_pct", "mem_pct"], None).await;
    h.respond("cpu_pct{instance=\"node1\"}", vector(json!([]))).await;
    h.respond("mem_pct{instance=\"node1\"}", vector(json!([]))).await;

    let request = QueryRequest {
        metric_ids: vec![usage.id],
        mode: QueryMode::Instant { time: None },
        instance_filter: Some("node1".to_string()),
    };
    h.service.query(request).await.unwrap();

    let mut received = h.received_queries().await;
    assert_eq!(received.len(), 2);
    received.sort_by(|a, b| param(a, "query").cmp(param(b, "query")));
    assert_eq!(param(&received[0], "query"), "cpu_pct{instance=\"node1\"}");
    assert_eq!(param(&received[1], "query"), "mem_pct{instance=\"node1\"}");
    assert_eq!(param(&received[0], "time"), param(&received[1], "time"));

    let requests = h.server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() == "/api/v1/query"));
}

#[tokio::test]
async fn range_query_defaults_step_and_window() {
    let h = Harness::start().await;
    let up = h.metric(&["up"], None).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query_range"))
        .and(query_param("step", "15s"))
        .respond_with(ResponseTemplate::new(200).set_body_json(matrix(json!([]))))
        .expect(1)
        .mount(&h.server)
        .await;

    let before = Utc::now().timestamp();
    let merged = h
        .service
        .query(QueryRequest {
            metric_ids: vec![up.id],
            mode: QueryMode::Range {
                start: None,
                end: None,
                step: None,
            },
            instance_filter: None,
        })
        .await
        .unwrap();
    let after = Utc::now().timestamp();

    assert_eq!(merged.data.result_type, "matrix");
    let received = h.received_queries().await;
    let start: i64 = param(&received[0], "start").parse().unwrap();
    let end: i64 = param(&received[0], "end").parse().unwrap();
    assert!(end >= before && end <= after);
    assert_eq!(end - start, 3600);
}

#[tokio::test]
async fn unknown_metric_fails_before_any_backend_call() {
    let h = Harness::start().await;
    let up = h.metric(&["up"], None).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vector(json!([]))))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h
        .service
        .query(instant(vec![up.id, 4242]))
        .await
        .unwrap_err();

    match err {
        GatewayError::MetricTypesNotFound { ids } => assert_eq!(ids, vec![4242]),
        other => panic!("expected MetricTypesNotFound, got {:?}", other),
    }
    assert!(h.received_queries().await.is_empty());
}

#[tokio::test]
async fn empty_request_is_invalid() {
    let h = Harness::start().await;
    let err = h.service.query(instant(vec![])).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidRequest(_)));
}

#[tokio::test]
async fn mixed_result_types_fail_the_call() {
    let h = Harness::start().await;
    let a = h.metric(&["a"], None).await;
    let b = h.metric(&["b"], None).await;
    h.respond("a", vector(json!([sample("a", "x")]))).await;
    h.respond("b", matrix(json!([]))).await;

    let err = h.service.query(instant(vec![a.id, b.id])).await.unwrap_err();

    assert!(matches!(err, GatewayError::InconsistentResultTypes { .. }));
}

#[tokio::test]
async fn one_slow_sub_query_fails_the_whole_call() {
    let h = Harness::with_timeout(Duration::from_millis(300)).await;
    let metric = h.metric(&["a", "b", "c", "slow"], None).await;
    for expr in ["a", "b", "c"] {
        h.respond(expr, vector(json!([sample(expr, "x")]))).await;
    }
    Mock::given(method("GET"))
        .and(query_param("query", "slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vector(json!([])))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&h.server)
        .await;

    let err = h.service.query(instant(vec![metric.id])).await.unwrap_err();

    match err {
        GatewayError::BackendUnavailable { query, status, .. } => {
            assert_eq!(query, "slow");
            assert_eq!(status, None);
        }
        other => panic!("expected BackendUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn backend_error_status_is_reported() {
    let h = Harness::start().await;
    let metric = h.metric(&["ok", "broken"], None).await;
    h.respond("ok", vector(json!([]))).await;
    Mock::given(method("GET"))
        .and(query_param("query", "broken"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&h.server)
        .await;

    let err = h.service.query(instant(vec![metric.id])).await.unwrap_err();

    match err {
        GatewayError::BackendUnavailable {
            query,
            status,
            detail,
        } => {
            assert_eq!(query, "broken");
            assert_eq!(status, Some(503));
            assert_eq!(detail, "overloaded");
        }
        other => panic!("expected BackendUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn unreachable_backend_is_unavailable() {
    let registry = Arc::new(DuckDbMetricRegistry::open_in_memory().unwrap());
    let up = registry
        .create(
            NewMetricType {
                name: "up".to_string(),
                description: String::new(),
                backend_identifiers: vec!["up".to_string()],
                unit: None,
            },
            None,
        )
        .await
        .unwrap();
    // Port 9 (discard) is not expected to accept HTTP connections.
    let executor = FanOutExecutor::new(
        reqwest::Client::new(),
        parse_base_url("http://127.0.0.1:9").unwrap(),
        Duration::from_secs(2),
    );
    let service = QueryService::new(registry, executor);

    let err = service.query(instant(vec![up.id])).await.unwrap_err();

    assert!(matches!(
        err,
        GatewayError::BackendUnavailable { status: None, .. }
    ));
}

#[tokio::test]
async fn malformed_backend_body_fails_the_call() {
    let h = Harness::start().await;
    let up = h.metric(&["up"], None).await;
    h.respond("up", json!({"status": "success", "data": {"resultType": "vector"}}))
        .await;

    let err = h.service.query(instant(vec![up.id])).await.unwrap_err();

    assert!(matches!(err, GatewayError::MalformedBackendResponse(_)));
}
