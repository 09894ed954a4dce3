use crate::datadog::DatadogConfig;
use crate::env::*;
use crate::init::LayerConfig;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

/// Everything the service needs at startup.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub datadog: DatadogConfig,
    pub listen_addr: SocketAddr,
    pub layer: LayerConfig,
}

/// Error type returned when the environment does not describe a usable
/// service.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DATADOG_TOKEN is not set")]
    MissingToken,

    #[error("invalid LISTEN_ADDR {0:?}")]
    InvalidListenAddr(String),

    #[error("invalid LOG_LEVEL {0:?}")]
    InvalidLevel(String),

    #[error("invalid boolean {value:?} for {key}")]
    InvalidBool { key: &'static str, value: String },
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let token = get(DATADOG_TOKEN_ENV).ok_or(ConfigError::MissingToken)?;
        let site = get(DATADOG_SITE_ENV).unwrap_or_else(|| DatadogConfig::DEFAULT_SITE.to_string());

        let mut datadog = DatadogConfig::for_site(token, site);
        if let Some(url) = get(DATADOG_API_URL_ENV) {
            datadog.api_url = url;
        }
        if let Some(url) = get(DATADOG_INTAKE_URL_ENV) {
            datadog.intake_url = url;
        }
        datadog.service = get(DATADOG_SERVICE_ENV);
        datadog.hostname = get(DATADOG_HOSTNAME_ENV);
        datadog.tags = get(DATADOG_TAGS_ENV)
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let listen = get(LISTEN_ADDR_ENV).unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr(listen.clone()))?;

        let mut layer = LayerConfig::default();
        if let Some(level) = get(LOG_LEVEL_ENV) {
            layer.min_level = Level::from_str(&level).map_err(|_| ConfigError::InvalidLevel(level.clone()))?;
        }
        if let Some(value) = get(LOG_STDOUT_ENV) {
            layer.enable_stdout = parse_bool(LOG_STDOUT_ENV, &value)?;
        }

        Ok(ServiceConfig { datadog, listen_addr, layer })
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool { key, value: value.to_string() }),
    }
}
