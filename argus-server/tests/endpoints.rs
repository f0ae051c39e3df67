//! End-to-end tests of the HTTP API over the in-memory backend.

use std::io::Write;

use argus_metrics::payload_digest;
use argus_server::{
    make_app, MemoryStorage, MetricsService, MetricsStorage, ServerConfig, ServiceState,
};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use similar_asserts::assert_eq;
use tower::util::ServiceExt;

fn test_app(config: ServerConfig) -> Router {
    let storage = MetricsStorage::Memory(MemoryStorage::new());
    let state = ServiceState::new(config, MetricsService::new(storage));
    make_app(state)
}

fn post_json(uri: &str, body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.into()))
        .expect("request must build")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request must build")
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body must be readable");
    String::from_utf8(bytes.to_vec()).expect("body must be utf-8")
}

#[tokio::test]
async fn test_counter_accumulates_across_batches() {
    let app = test_app(ServerConfig::default());
    let batch = r#"[{"id":"PollCount","type":"counter","delta":1}]"#;

    for _ in 0..3 {
        let response = app.clone().oneshot(post_json("/updates/", batch)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.oneshot(get("/value/counter/PollCount")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "3");
}

#[tokio::test]
async fn test_gauge_last_write_wins() {
    let app = test_app(ServerConfig::default());

    for value in ["100.0", "55.5"] {
        let body = format!(r#"{{"id":"Alloc","type":"gauge","value":{value}}}"#);
        let response = app.clone().oneshot(post_json("/update/", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.oneshot(get("/value/gauge/Alloc")).await.unwrap();
    assert_eq!(body_string(response).await, "55.5");
}

#[tokio::test]
async fn test_resent_batch_double_counts() {
    // Delivery is at-least-once: a batch replayed after a lost response is
    // merged again, and counters double.
    let app = test_app(ServerConfig::default());
    let batch = r#"[{"id":"PollCount","type":"counter","delta":5}]"#;

    app.clone().oneshot(post_json("/updates/", batch)).await.unwrap();
    app.clone().oneshot(post_json("/updates/", batch)).await.unwrap();

    let response = app.oneshot(get("/value/counter/PollCount")).await.unwrap();
    assert_eq!(body_string(response).await, "10");
}

#[tokio::test]
async fn test_path_update_endpoint() {
    let app = test_app(ServerConfig::default());

    let response = app
        .clone()
        .oneshot(post_json("/update/gauge/Alloc/99.5", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/value/gauge/Alloc")).await.unwrap();
    assert_eq!(body_string(response).await, "99.5");
}

#[tokio::test]
async fn test_unknown_type_is_bad_request() {
    let app = test_app(ServerConfig::default());

    let response = app
        .clone()
        .oneshot(post_json("/update/histogram/X/1", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_json("/update/counter/X/12.5", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_metric_is_not_found() {
    let app = test_app(ServerConfig::default());

    let response = app
        .clone()
        .oneshot(get("/value/gauge/Missing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(post_json("/value/", r#"{"id":"Missing","type":"counter"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_value_json_lookup() {
    let app = test_app(ServerConfig::default());

    app.clone()
        .oneshot(post_json(
            "/update/",
            r#"{"id":"PollCount","type":"counter","delta":7}"#,
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(post_json("/value/", r#"{"id":"PollCount","type":"counter"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["id"], "PollCount");
    assert_eq!(body["delta"], 7);
}

#[tokio::test]
async fn test_signed_request_and_response() {
    let config = ServerConfig {
        hash_key: Some("K".to_owned()),
        ..Default::default()
    };
    let app = test_app(config);
    let batch = r#"[{"id":"Alloc","type":"gauge","value":1.5}]"#;

    // correct digest is accepted, and the response carries its own digest
    let request = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header(header::CONTENT_TYPE, "application/json")
        .header("HashSHA256", payload_digest(batch.as_bytes(), "K"))
        .body(Body::from(batch))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let header = response
        .headers()
        .get("HashSHA256")
        .expect("response must be signed")
        .to_str()
        .unwrap()
        .to_owned();
    let body = body_string(response).await;
    assert_eq!(header, payload_digest(body.as_bytes(), "K"));

    // a wrong digest is rejected before anything is written
    let request = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header(header::CONTENT_TYPE, "application/json")
        .header("HashSHA256", "deadbeef")
        .body(Body::from(batch))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // a request without the digest header is rejected, and nothing lands
    let unsigned = r#"[{"id":"Unsigned","type":"gauge","value":9.0}]"#;
    let response = app
        .clone()
        .oneshot(post_json("/updates/", unsigned))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.oneshot(get("/value/gauge/Unsigned")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_gzip_request_body() {
    let app = test_app(ServerConfig::default());
    let batch = r#"[{"id":"Sys","type":"gauge","value":2048.0}]"#;

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(batch.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from(compressed))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/value/gauge/Sys")).await.unwrap();
    assert_eq!(body_string(response).await, "2048");
}

#[tokio::test]
async fn test_trusted_subnet_guards_updates_only() {
    let config = ServerConfig {
        trusted_subnet: Some("10.0.0.0/8".parse().unwrap()),
        ..Default::default()
    };
    let app = test_app(config);
    let batch = r#"[{"id":"PollCount","type":"counter","delta":1}]"#;

    // no header: rejected
    let response = app.clone().oneshot(post_json("/updates/", batch)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // outside the subnet: rejected
    let request = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Real-IP", "192.168.1.1")
        .body(Body::from(batch))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // inside the subnet: accepted
    let request = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Real-IP", "10.1.2.3")
        .body(Body::from(batch))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // reads are not guarded
    let response = app.oneshot(get("/value/counter/PollCount")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_index_lists_metrics() {
    let app = test_app(ServerConfig::default());

    app.clone()
        .oneshot(post_json(
            "/updates/",
            r#"[{"id":"Alloc","type":"gauge","value":1.5},
                {"id":"PollCount","type":"counter","delta":2}]"#,
        ))
        .await
        .unwrap();

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    let records = body.as_array().expect("index must be a JSON array");
    assert_eq!(records.len(), 2);
    // ordered by storage key
    assert_eq!(records[0]["name"], "Alloc");
    assert_eq!(records[0]["type"], "gauge");
    assert_eq!(records[0]["value"], 1.5);
    assert_eq!(records[1]["name"], "PollCount");
    assert_eq!(records[1]["value"], 2);
}

#[tokio::test]
async fn test_ping_memory_backend_is_healthy() {
    let app = test_app(ServerConfig::default());
    let response = app.oneshot(get("/ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_batch_is_bad_request() {
    let app = test_app(ServerConfig::default());

    // not JSON at all
    let response = app
        .clone()
        .oneshot(post_json("/updates/", "{not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // a counter without its delta
    let response = app
        .oneshot(post_json(
            "/updates/",
            r#"[{"id":"PollCount","type":"counter"}]"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
