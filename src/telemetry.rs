use crate::init::LayerConfig;
use crate::layer::SinkLayer;
use crate::logger::{FlushLogger, Logger};
use crate::sink::LogSink;
use crate::worker::{self, FlushError, FlushHandle, QueueStats, RecordQueue, WorkerSettings};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Owned connection to a [`LogSink`]: one delivery task plus the handles
/// that feed and flush it.
///
/// Create it once at startup, hand out loggers and layers, and call
/// [`Telemetry::close`] on the way out so the last batch is not lost.
pub struct Telemetry {
    queue: RecordQueue,
    flusher: FlushHandle,
    worker: JoinHandle<()>,
    config: LayerConfig,
}

impl Telemetry {
    /// Spawn the delivery task for `sink`. Must be called inside a Tokio
    /// runtime.
    pub fn connect(sink: Arc<dyn LogSink>, config: LayerConfig) -> Self {
        let settings = WorkerSettings {
            buffer: config.channel_buffer,
            batch_size: config.batch_size,
            flush_interval: config.flush_interval,
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        };
        let (queue, flusher, worker) = worker::spawn(sink, settings);
        Self { queue, flusher, worker, config }
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    /// Tracing layer that forwards events into this connection.
    pub fn layer(&self) -> SinkLayer {
        SinkLayer::new(self.queue.clone(), self.config.min_level)
    }

    pub fn logger(&self, name: impl Into<String>) -> Logger {
        Logger::new(self.queue.clone(), self.config.min_level, name)
    }

    pub fn flush_logger(&self, name: impl Into<String>) -> FlushLogger {
        FlushLogger::new(self.logger(name), self.flusher())
    }

    pub fn flusher(&self) -> FlushHandle {
        self.flusher.clone()
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(self.queue.stats())
    }

    pub async fn flush(&self) -> Result<(), FlushError> {
        self.flusher.flush().await
    }

    /// Deliver what is pending, flush the sink and stop the delivery task.
    ///
    /// Loggers and layers still holding the queue keep working but their
    /// records are counted as dropped from here on.
    pub async fn close(self) -> Result<(), FlushError> {
        let flushed = self.flusher.shutdown().await;
        if let Err(e) = self.worker.await {
            eprintln!("log delivery task ended abnormally: {}", e);
            return Err(FlushError::WorkerStopped);
        }
        flushed
    }
}
