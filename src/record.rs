use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Ordered structured fields attached to a [`LogRecord`].
pub type Fields = BTreeMap<String, serde_json::Value>;

/// A single structured log entry, produced either by the tracing layer or
/// by a [`Logger`](crate::logger::Logger) and consumed by a sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub module_path: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub fields: Fields,
    pub message: Option<String>,
}

impl LogRecord {
    /// Record stamped with the current time and no source location.
    pub fn now(level: tracing::Level, target: impl Into<String>, fields: Fields, message: Option<String>) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            level: level.to_string(),
            target: target.into(),
            module_path: None,
            file: None,
            line: None,
            fields,
            message,
        }
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }
}
