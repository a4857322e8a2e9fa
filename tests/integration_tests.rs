//! Integration tests for the relay server
//!
//! These tests drive the full router through `oneshot`, covering behaviour that spans layers:
//! CORS preflight, concurrent requests and the transport-failure paths.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use ollama_relay::test_utils::MockHttpClient;
use ollama_relay::upstream::Upstream;
use ollama_relay::{AppState, build_router};
use serde_json::json;
use std::time::Duration;
use tower::util::ServiceExt; // for oneshot()

fn app(mock_client: MockHttpClient) -> axum::Router {
    build_router(AppState::with_client(Upstream::default(), mock_client))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_preflight_allows_any_origin_on_every_route() {
    let app = app(MockHttpClient::new(StatusCode::OK, "{}"));

    for path in ["/proxy/generate", "/proxy/tags", "/check-ollama", "/status", "/echo"] {
        let request = Request::builder()
            .method("OPTIONS")
            .uri(path)
            .header("origin", "chrome-extension://abcdefghijklmnop")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type,x-custom")
            .body(Body::empty())
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert!(response.status().is_success(), "preflight failed for {path}");

        let headers = response.headers();
        assert_eq!(
            headers["access-control-allow-origin"],
            "chrome-extension://abcdefghijklmnop"
        );
        assert_eq!(headers["access-control-allow-credentials"], "true");

        let methods = headers["access-control-allow-methods"].to_str().unwrap();
        for method in ["GET", "POST", "OPTIONS", "PUT", "DELETE", "PATCH"] {
            assert!(methods.contains(method), "{method} missing from {methods}");
        }

        let allowed_headers = headers["access-control-allow-headers"].to_str().unwrap();
        assert!(allowed_headers.contains("x-custom"));
    }
}

#[tokio::test]
async fn test_cors_headers_on_relayed_error() {
    let app = app(MockHttpClient::failing("connection refused"));

    let request = Request::builder()
        .method("GET")
        .uri("/proxy/tags")
        .header("origin", "http://localhost:5173")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://localhost:5173"
    );
    let body = body_json(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_status_is_not_blocked_by_slow_generate() {
    let mock_client = MockHttpClient::new(StatusCode::OK, r#"{"response":"late"}"#)
        .with_delay(Duration::from_secs(30));
    let app = app(mock_client.clone());

    let generate = Request::builder()
        .method("POST")
        .uri("/proxy/generate")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&json!({"model": "llama3:8b", "prompt": "slow", "stream": false}))
                .unwrap(),
        ))
        .unwrap();
    let in_flight = tokio::spawn(app.clone().oneshot(generate));

    // Wait until the generate call has actually reached the upstream.
    while mock_client.get_requests().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let status = Request::builder()
        .method("GET")
        .uri("/status")
        .body(Body::empty())
        .unwrap();
    let response = tokio::time::timeout(Duration::from_secs(2), app.oneshot(status))
        .await
        .expect("/status should not wait for the in-flight generate")
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!in_flight.is_finished());
    in_flight.abort();
}

#[tokio::test]
async fn test_concurrent_relays_are_independent() {
    let mock_client = MockHttpClient::new(StatusCode::OK, r#"{"models":[]}"#)
        .with_delay(Duration::from_millis(50));
    let app = app(mock_client.clone());

    let calls = (0..8).map(|_| {
        let request = Request::builder()
            .method("GET")
            .uri("/proxy/tags")
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(request)
    });
    let responses = futures_util::future::join_all(calls).await;

    for response in responses {
        let response = response.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"models": []}));
    }
    assert_eq!(mock_client.get_requests().len(), 8);
}

#[tokio::test]
async fn test_echo_round_trip_matches_test_client() {
    let app = app(MockHttpClient::new(StatusCode::OK, "{}"));

    let request = Request::builder()
        .method("POST")
        .uri("/echo")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"test":"Echo test data"}"#))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["message"], "Echo successful");
    assert_eq!(body["receivedData"], json!({"test": "Echo test data"}));
    assert_eq!(body["headers"]["content-type"], "application/json");
}
