use crate::record::LogRecord;
use crate::sink::{BoxError, LogSink};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

/// Header carrying the API key on every Datadog request.
const API_KEY_HEADER: &str = "DD-API-KEY";

/// Datadog rejects intake payloads with more entries than this. Advertised
/// through [`LogSink::max_batch_len`], so the delivery worker sends one
/// request per batch.
pub const MAX_BATCH_ENTRIES: usize = 1000;

/// Configuration for [`DatadogSink`].
///
/// `api_url` is used for key validation, `intake_url` for log submission.
/// Both are derived from `site` by [`DatadogConfig::new`] and can be
/// overridden to point at a proxy.
#[derive(Clone, Debug)]
pub struct DatadogConfig {
    pub api_key: String,
    pub site: String,
    /// Base URL without path, e.g. "https://api.datadoghq.com"
    pub api_url: String,
    /// Base URL without path, e.g. "https://http-intake.logs.datadoghq.com"
    pub intake_url: String,
    pub service: Option<String>,
    pub hostname: Option<String>,
    pub source: String,
    pub tags: Vec<String>,
    pub timeout: Duration,
}

impl DatadogConfig {
    pub const DEFAULT_SITE: &'static str = "datadoghq.com";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self::for_site(api_key, Self::DEFAULT_SITE)
    }

    pub fn for_site(api_key: impl Into<String>, site: impl Into<String>) -> Self {
        let site = site.into();
        DatadogConfig {
            api_key: api_key.into(),
            api_url: format!("https://api.{}", site),
            intake_url: format!("https://http-intake.logs.{}", site),
            site,
            service: None,
            hostname: None,
            source: "rust".to_string(),
            tags: Vec::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Error returned by [`DatadogSink::dial`].
#[derive(thiserror::Error, Debug)]
pub enum DialError {
    #[error("datadog api key is missing")]
    MissingApiKey,

    #[error("datadog rejected the api key with status {0}")]
    Rejected(StatusCode),

    #[error("datadog api unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Datadog implementation of [`LogSink`] using the HTTP logs intake.
///
/// Every `send` is one synchronous HTTP round trip, so the sink holds no
/// buffer of its own and keeps the default no-op `flush`.
#[derive(Clone)]
pub struct DatadogSink {
    client: Client,
    config: DatadogConfig,
}

impl DatadogSink {
    /// Build the client and verify the API key before any record is sent.
    ///
    /// **Returns**
    /// - A ready-to-use [`DatadogSink`] that can be passed into
    ///   [`Telemetry::connect`](crate::telemetry::Telemetry::connect).
    /// - `Err(..)` if the key is blank, rejected, or the API cannot be
    ///   reached. Startup should stop here.
    pub async fn dial(config: DatadogConfig) -> Result<Self, DialError> {
        if config.api_key.trim().is_empty() {
            return Err(DialError::MissingApiKey);
        }
        let client = Client::builder().timeout(config.timeout).build()?;
        let sink = Self { client, config };
        sink.validate_api_key().await?;
        Ok(sink)
    }

    pub fn config(&self) -> &DatadogConfig {
        &self.config
    }

    /// `GET /api/v1/validate`; any non-success status is a rejection.
    pub async fn validate_api_key(&self) -> Result<(), DialError> {
        let url = format!("{}/api/v1/validate", self.config.api_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(DialError::Rejected(resp.status()));
        }
        Ok(())
    }

    fn endpoint(&self) -> String {
        format!("{}/api/v2/logs", self.config.intake_url.trim_end_matches('/'))
    }

    fn map_record(&self, record: &LogRecord) -> DatadogEntry {
        DatadogEntry {
            message: record.message.clone().unwrap_or_default(),
            status: record.level.to_ascii_lowercase(),
            timestamp: record.timestamp.timestamp_millis(),
            service: self.config.service.clone(),
            hostname: self.config.hostname.clone(),
            ddsource: self.config.source.clone(),
            ddtags: (!self.config.tags.is_empty()).then(|| self.config.tags.join(",")),
            logger_name: record.target.clone(),
            attributes: record.fields.clone(),
        }
    }
}

#[derive(Serialize)]
struct DatadogEntry {
    message: String,
    status: String,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hostname: Option<String>,
    ddsource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ddtags: Option<String>,
    #[serde(rename = "logger.name")]
    logger_name: String,
    #[serde(flatten)]
    attributes: crate::record::Fields,
}

#[async_trait]
impl LogSink for DatadogSink {
    /// Larger slices (only possible when called directly) are posted in
    /// several requests; a failure part way leaves earlier chunks accepted.
    async fn send(&self, records: &[LogRecord]) -> Result<(), BoxError> {
        for chunk in records.chunks(MAX_BATCH_ENTRIES) {
            let entries: Vec<DatadogEntry> = chunk.iter().map(|r| self.map_record(r)).collect();
            let resp = self
                .client
                .post(self.endpoint())
                .header(API_KEY_HEADER, &self.config.api_key)
                .json(&entries)
                .send()
                .await?;
            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
                return Err(format!("Datadog logs intake failed with status {}: {}", status, text).into());
            }
        }
        Ok(())
    }

    fn max_batch_len(&self) -> Option<usize> {
        Some(MAX_BATCH_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode as HttpStatus};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    const GOOD_KEY: &str = "good-key";

    #[derive(Clone, Default)]
    struct Intake {
        payloads: Arc<Mutex<Vec<Value>>>,
    }

    async fn validate(headers: HeaderMap) -> HttpStatus {
        match headers.get(API_KEY_HEADER) {
            Some(key) if key == GOOD_KEY => HttpStatus::OK,
            _ => HttpStatus::FORBIDDEN,
        }
    }

    async fn logs(State(intake): State<Intake>, Json(body): Json<Value>) -> HttpStatus {
        intake.payloads.lock().unwrap().push(body);
        HttpStatus::ACCEPTED
    }

    /// Local stand-in for both Datadog hosts.
    async fn mock_datadog() -> (String, Intake) {
        let intake = Intake::default();
        let app = Router::new()
            .route("/api/v1/validate", get(validate))
            .route("/api/v2/logs", post(logs))
            .with_state(intake.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), intake)
    }

    fn config(key: &str, base: &str) -> DatadogConfig {
        DatadogConfig {
            api_url: base.to_string(),
            intake_url: base.to_string(),
            service: Some("example".to_string()),
            tags: vec!["env:test".to_string(), "team:api".to_string()],
            ..DatadogConfig::new(key)
        }
    }

    fn record(message: &str) -> LogRecord {
        let mut fields = crate::record::Fields::new();
        fields.insert("host".to_string(), json!("example.com"));
        fields.insert("headers".to_string(), json!({"User-Agent": "curl/7.0"}));
        LogRecord::now(tracing::Level::INFO, "api", fields, Some(message.to_string()))
    }

    #[test]
    fn urls_follow_the_site() {
        let config = DatadogConfig::for_site("k", "datadoghq.eu");
        assert_eq!(config.api_url, "https://api.datadoghq.eu");
        assert_eq!(config.intake_url, "https://http-intake.logs.datadoghq.eu");
    }

    #[tokio::test]
    async fn blank_key_fails_without_network() {
        let err = DatadogSink::dial(config("  ", "http://127.0.0.1:1")).await.err();
        assert!(matches!(err, Some(DialError::MissingApiKey)));
    }

    #[tokio::test]
    async fn rejected_key_fails_dial() {
        let (base, _intake) = mock_datadog().await;
        let err = DatadogSink::dial(config("bad-key", &base)).await.err();
        assert!(matches!(err, Some(DialError::Rejected(status)) if status == StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn send_posts_entries_with_attributes() {
        let (base, intake) = mock_datadog().await;
        let sink = DatadogSink::dial(config(GOOD_KEY, &base)).await.unwrap();

        sink.send(&[record("HTTP/1.1 GET /test")]).await.unwrap();

        let payloads = intake.payloads.lock().unwrap().clone();
        assert_eq!(payloads.len(), 1);
        let entry = &payloads[0][0];
        assert_eq!(entry["message"], "HTTP/1.1 GET /test");
        assert_eq!(entry["status"], "info");
        assert_eq!(entry["service"], "example");
        assert_eq!(entry["ddsource"], "rust");
        assert_eq!(entry["ddtags"], "env:test,team:api");
        assert_eq!(entry["logger.name"], "api");
        assert_eq!(entry["host"], "example.com");
        assert_eq!(entry["headers"]["User-Agent"], "curl/7.0");
        assert!(entry.get("hostname").is_none());
    }

    #[tokio::test]
    async fn large_batches_are_split() {
        let (base, intake) = mock_datadog().await;
        let sink = DatadogSink::dial(config(GOOD_KEY, &base)).await.unwrap();

        let batch: Vec<_> = (0..MAX_BATCH_ENTRIES + 5).map(|i| record(&i.to_string())).collect();
        sink.send(&batch).await.unwrap();

        let sizes: Vec<_> = intake
            .payloads
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.as_array().map(Vec::len).unwrap_or(0))
            .collect();
        assert_eq!(sizes, vec![MAX_BATCH_ENTRIES, 5]);
    }

    #[tokio::test]
    async fn worker_batches_never_exceed_one_intake_request() {
        let (base, intake) = mock_datadog().await;
        let sink = DatadogSink::dial(config(GOOD_KEY, &base)).await.unwrap();
        assert_eq!(sink.max_batch_len(), Some(MAX_BATCH_ENTRIES));

        let layer = crate::init::LayerConfig {
            channel_buffer: 4096,
            batch_size: 5000,
            enable_stdout: false,
            ..crate::init::LayerConfig::default()
        };
        let telemetry = crate::telemetry::Telemetry::connect(Arc::new(sink), layer);
        let log = telemetry.logger("api");
        for i in 0..MAX_BATCH_ENTRIES + 5 {
            log.info(i);
        }
        telemetry.flush().await.unwrap();

        let sizes: Vec<_> = intake
            .payloads
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.as_array().map(Vec::len).unwrap_or(0))
            .collect();
        assert_eq!(sizes, vec![MAX_BATCH_ENTRIES, 5]);
    }
}
