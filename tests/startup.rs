#![cfg(feature = "datadog")]

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt; // for .oneshot()

use tracing_flush_sink::app::{App, AppError};
use tracing_flush_sink::config::ServiceConfig;
use tracing_flush_sink::datadog::DialError;
use tracing_flush_sink::env::{DATADOG_API_URL_ENV, DATADOG_INTAKE_URL_ENV, DATADOG_TOKEN_ENV, LOG_STDOUT_ENV};
use tracing_flush_sink::memory_sink::MemorySink;
use tracing_flush_sink::worker::FlushError;

const GOOD_KEY: &str = "good-key";

/// Minimal Datadog stand-in: validates the key and counts intake posts.
async fn mock_datadog() -> (String, Arc<AtomicUsize>) {
    let posted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&posted);
    let app = Router::new()
        .route(
            "/api/v1/validate",
            get(|headers: HeaderMap| async move {
                match headers.get("DD-API-KEY") {
                    Some(key) if key == GOOD_KEY => StatusCode::OK,
                    _ => StatusCode::FORBIDDEN,
                }
            }),
        )
        .route(
            "/api/v2/logs",
            post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::ACCEPTED
                }
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), posted)
}

fn config(token: &str, base: &str) -> ServiceConfig {
    ServiceConfig::from_lookup(|key| match key {
        k if k == DATADOG_TOKEN_ENV => Some(token.to_string()),
        k if k == DATADOG_API_URL_ENV || k == DATADOG_INTAKE_URL_ENV => Some(base.to_string()),
        k if k == LOG_STDOUT_ENV => Some("false".to_string()),
        _ => None,
    })
    .unwrap()
}

#[tokio::test]
async fn bad_token_stops_startup() {
    let (base, posted) = mock_datadog().await;

    let result = App::bootstrap(&config("bad-token", &base)).await;

    assert!(matches!(
        result,
        Err(AppError::Dial(DialError::Rejected(status))) if status.as_u16() == 403
    ));
    assert_eq!(posted.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreachable_api_stops_startup() {
    // Bind then drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let result = App::bootstrap(&config(GOOD_KEY, &base)).await;

    assert!(matches!(result, Err(AppError::Dial(DialError::Transport(_)))));
}

#[tokio::test]
async fn good_token_serves_and_ships_the_request_log() {
    let (base, posted) = mock_datadog().await;
    let app = App::bootstrap(&config(GOOD_KEY, &base)).await.unwrap();

    let mut req = Request::builder()
        .uri("/test")
        .header("host", "example.com")
        .body(Body::empty())
        .unwrap();
    req.extensions_mut()
        .insert(ConnectInfo("10.0.0.5:4321".parse::<SocketAddr>().unwrap()));
    let response = app.router().oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    // The handler only returns after the intake accepted the batch.
    assert_eq!(posted.load(Ordering::SeqCst), 1);
    assert_eq!(app.telemetry().stats().delivered(), 1);
}

#[tokio::test]
async fn failed_request_flush_stops_the_server() {
    let sink = Arc::new(MemorySink::new());
    sink.fail_sends(true);
    let mut config = config(GOOD_KEY, "http://127.0.0.1:1");
    config.layer.max_retries = 0;
    let app = App::with_sink(sink, &config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(app.serve(listener));

    let response = reqwest::get(format!("http://{}/test", addr)).await.unwrap();
    assert_eq!(response.status().as_u16(), 500);

    let served = tokio::time::timeout(std::time::Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(matches!(served, Err(AppError::Fatal(FlushError::Delivery(_)))));
}
