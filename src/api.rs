//! The single `GET /test` route.
//!
//! Each request produces exactly one INFO record describing it, then a
//! flush, then the greeting. The flush runs through
//! [`FlushLogger::flushing`], so it happens on every exit path. A failed
//! flush trips the [`FatalSignal`], which takes the whole server down.

use crate::logger::FlushLogger;
use crate::worker::FlushError;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

pub const GREETING: &str = "hi datadog support!";

/// State shared by all handlers.
#[derive(Clone)]
pub struct Api {
    log: Arc<FlushLogger>,
    fatal: FatalSignal,
}

/// Build the router. Serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()` so the remote
/// address is available.
pub fn router(log: Arc<FlushLogger>, fatal: FatalSignal) -> Router {
    Router::new().route("/test", get(hello)).with_state(Api { log, fatal })
}

/// Latch set by the first request whose flush failed.
///
/// Only the first error is kept. The server selects on [`tripped`] for
/// its shutdown.
///
/// [`tripped`]: FatalSignal::tripped
#[derive(Clone)]
pub struct FatalSignal {
    tx: Arc<watch::Sender<Option<FlushError>>>,
}

impl Default for FatalSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl FatalSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn trip(&self, err: FlushError) {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(err);
            true
        });
    }

    /// The error that tripped the signal, if any.
    pub fn error(&self) -> Option<FlushError> {
        self.tx.borrow().clone()
    }

    /// Resolves once the signal is tripped.
    pub async fn tripped(&self) -> FlushError {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(err) = rx.borrow_and_update().clone() {
                return err;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

async fn hello(
    State(api): State<Api>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request,
) -> Result<&'static str, ApiError> {
    let summary = RequestSummary::new(&request, remote);

    api.log.with_fields(summary.fields()).info(summary.message());

    match api.log.flushing(async { GREETING }).await {
        Ok(body) => Ok(body),
        Err(e) => {
            api.fatal.trip(e.clone());
            Err(ApiError::Flush(e))
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("telemetry flush failed: {0}")]
    Flush(#[from] FlushError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// What gets logged about one request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSummary {
    pub host: String,
    pub ip: String,
    pub headers: BTreeMap<String, String>,
    pub ua: String,
    pub protocol: String,
    pub method: String,
    pub path: String,
    pub query: String,
}

impl RequestSummary {
    pub fn new<B>(request: &axum::http::Request<B>, remote: SocketAddr) -> Self {
        let headers = request.headers();
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .or_else(|| request.uri().authority().map(|a| a.to_string()))
            .unwrap_or_default();
        let ua = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        // Host is reported on its own, not among the headers.
        let mut flattened = flatten_headers(headers);
        flattened.remove("Host");

        RequestSummary {
            host,
            ip: remote.to_string(),
            headers: flattened,
            ua,
            protocol: format!("{:?}", request.version()),
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            query: request.uri().query().unwrap_or_default().to_string(),
        }
    }

    pub fn message(&self) -> String {
        format!("{} {} {} {}", self.protocol, self.method, self.path, self.query)
            .trim_end()
            .to_string()
    }

    pub fn fields(&self) -> [(&'static str, Value); 4] {
        let headers = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        [
            ("host", Value::String(self.host.clone())),
            ("ip", Value::String(self.ip.clone())),
            ("headers", Value::Object(headers)),
            ("ua", Value::String(self.ua.clone())),
        ]
    }
}

/// One display string per header name: values joined with ", " in the
/// order they arrived, names in canonical `Title-Case`.
pub fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            (canonical_header_name(name.as_str()), joined)
        })
        .collect()
}

/// `x-forwarded-for` → `X-Forwarded-For`.
pub fn canonical_header_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        upper = c == '-';
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Version};

    #[test]
    fn multi_value_headers_join_in_order() {
        let mut headers = HeaderMap::new();
        headers.append("x-forwarded", HeaderValue::from_static("a"));
        headers.append("x-forwarded", HeaderValue::from_static("b"));
        headers.append("x-forwarded", HeaderValue::from_static("c"));
        headers.insert("accept", HeaderValue::from_static("*/*"));

        let flat = flatten_headers(&headers);

        assert_eq!(flat.get("X-Forwarded").map(String::as_str), Some("a, b, c"));
        assert_eq!(flat.get("Accept").map(String::as_str), Some("*/*"));
        assert_eq!(flat.len(), 2);
    }

    #[tokio::test]
    async fn fatal_signal_keeps_the_first_error() {
        let fatal = FatalSignal::new();
        assert_eq!(fatal.error(), None);

        let waiter = tokio::spawn({
            let fatal = fatal.clone();
            async move { fatal.tripped().await }
        });
        fatal.trip(FlushError::Dropped(2));
        fatal.trip(FlushError::WorkerStopped);

        assert_eq!(waiter.await.unwrap(), FlushError::Dropped(2));
        assert_eq!(fatal.error(), Some(FlushError::Dropped(2)));
        assert_eq!(fatal.tripped().await, FlushError::Dropped(2));
    }

    #[test]
    fn header_names_are_canonicalized() {
        assert_eq!(canonical_header_name("user-agent"), "User-Agent");
        assert_eq!(canonical_header_name("x-forwarded-for"), "X-Forwarded-For");
        assert_eq!(canonical_header_name("dnt"), "Dnt");
    }

    #[test]
    fn summary_describes_the_request() {
        let request = axum::http::Request::builder()
            .method("GET")
            .uri("/test?debug=1")
            .version(Version::HTTP_11)
            .header("host", "example.com")
            .header("user-agent", "curl/7.0")
            .body(())
            .unwrap();

        let summary = RequestSummary::new(&request, "10.0.0.5:4321".parse().unwrap());

        assert_eq!(summary.host, "example.com");
        assert_eq!(summary.ip, "10.0.0.5:4321");
        assert_eq!(summary.ua, "curl/7.0");
        assert_eq!(summary.message(), "HTTP/1.1 GET /test debug=1");
        assert!(!summary.headers.contains_key("Host"));
        assert_eq!(summary.headers.get("User-Agent").map(String::as_str), Some("curl/7.0"));
    }

    #[test]
    fn host_falls_back_to_uri_authority() {
        let request = axum::http::Request::builder()
            .uri("http://api.internal:8080/test")
            .version(Version::HTTP_2)
            .body(())
            .unwrap();

        let summary = RequestSummary::new(&request, "127.0.0.1:1".parse().unwrap());

        assert_eq!(summary.host, "api.internal:8080");
        assert_eq!(summary.ua, "");
        assert_eq!(summary.message(), "HTTP/2.0 GET /test");
    }
}
