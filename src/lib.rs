pub mod record;
pub mod sink;
pub mod memory_sink;
pub mod worker;
pub mod layer;
pub mod logger;
pub mod telemetry;
pub mod init;
pub mod api;

#[cfg(feature = "datadog")]
pub mod datadog;
#[cfg(feature = "datadog")]
pub mod env;
#[cfg(feature = "datadog")]
pub mod config;
#[cfg(feature = "datadog")]
pub mod app;
