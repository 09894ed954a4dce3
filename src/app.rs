use crate::api::{self, FatalSignal};
use crate::config::ServiceConfig;
use crate::datadog::{DatadogSink, DialError};
use crate::sink::LogSink;
use crate::telemetry::Telemetry;
use crate::worker::FlushError;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Name used as the record target for request logs.
pub const REQUEST_LOGGER: &str = "api";

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("could not connect to datadog: {0}")]
    Dial(#[from] DialError),

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("final telemetry flush failed: {0}")]
    Flush(#[from] FlushError),

    #[error("request flush failed, server stopped: {0}")]
    Fatal(FlushError),
}

/// A connected telemetry sink plus the router that logs through it.
pub struct App {
    telemetry: Telemetry,
    router: Router,
    fatal: FatalSignal,
}

impl App {
    /// Dial Datadog and wire everything up. Nothing is routable unless the
    /// sink accepted the API key.
    pub async fn bootstrap(config: &ServiceConfig) -> Result<Self, AppError> {
        let sink = DatadogSink::dial(config.datadog.clone()).await?;
        Ok(Self::with_sink(Arc::new(sink), config))
    }

    /// Same wiring over any sink. Must be called inside a Tokio runtime.
    pub fn with_sink(sink: Arc<dyn LogSink>, config: &ServiceConfig) -> Self {
        let telemetry = Telemetry::connect(sink, config.layer.clone());
        let log = Arc::new(telemetry.flush_logger(REQUEST_LOGGER));
        let fatal = FatalSignal::new();
        let router = api::router(log, fatal.clone());
        Self { telemetry, router, fatal }
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn fatal(&self) -> &FatalSignal {
        &self.fatal
    }

    /// Serve until ctrl-c or until a request flush fails, then close the
    /// telemetry connection so the last batch is delivered.
    ///
    /// A failed request flush is returned as [`AppError::Fatal`].
    pub async fn serve(self, listener: TcpListener) -> Result<(), AppError> {
        let App { telemetry, router, fatal } = self;

        let served = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal(fatal.clone()))
        .await;
        if let Err(e) = &served {
            tracing::error!(error = %e, "server died");
        }

        let closed = telemetry.close().await;
        served?;
        if let Some(e) = fatal.error() {
            return Err(AppError::Fatal(e));
        }
        closed?;
        Ok(())
    }
}

async fn shutdown_signal(fatal: FatalSignal) {
    tokio::select! {
        _ = ctrl_c() => tracing::info!("shutdown signal received"),
        err = fatal.tripped() => tracing::error!(error = %err, "telemetry flush failed, shutting down"),
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
