//! Environment variable names read by [`ServiceConfig::from_env`](crate::config::ServiceConfig::from_env).
//!
//! These are purely helpers; the sink and logger types remain decoupled
//! from environment access.

/// Datadog API key. Required.
pub const DATADOG_TOKEN_ENV: &str = "DATADOG_TOKEN";

/// Datadog site, e.g. `datadoghq.eu`. Defaults to `datadoghq.com`.
pub const DATADOG_SITE_ENV: &str = "DATADOG_SITE";

/// Override for the API base URL used to validate the key.
pub const DATADOG_API_URL_ENV: &str = "DATADOG_API_URL";

/// Override for the logs intake base URL.
pub const DATADOG_INTAKE_URL_ENV: &str = "DATADOG_INTAKE_URL";

/// Optional `service` attribute on every entry.
pub const DATADOG_SERVICE_ENV: &str = "DATADOG_SERVICE";

/// Optional `hostname` attribute on every entry.
pub const DATADOG_HOSTNAME_ENV: &str = "DATADOG_HOSTNAME";

/// Comma-separated `key:value` tags.
pub const DATADOG_TAGS_ENV: &str = "DATADOG_TAGS";

/// Socket address the HTTP server binds to.
pub const LISTEN_ADDR_ENV: &str = "LISTEN_ADDR";

/// Most verbose level shipped to the sink (`error`, `warn`, `info`, `debug`, `trace`).
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Whether events are also printed to stdout.
pub const LOG_STDOUT_ENV: &str = "LOG_STDOUT";

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
