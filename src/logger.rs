//! Structured logger with a flush that is bound at construction time.
//!
//! [`Logger`] builds [`LogRecord`]s directly (so nested maps such as request
//! headers stay structured) and hands them to the delivery queue.
//! [`FlushLogger`] pairs a `Logger` with the [`FlushHandle`] of the same
//! delivery task; there is no way to obtain one without the other.

use crate::record::{Fields, LogRecord};
use crate::worker::{FlushError, FlushHandle, RecordQueue};
use futures_util::FutureExt;
use std::fmt::Display;
use std::future::Future;
use std::ops::Deref;
use std::panic::AssertUnwindSafe;
use tracing::Level;

/// Leveled structured logger writing into a delivery queue.
#[derive(Clone)]
pub struct Logger {
    queue: RecordQueue,
    level: Level,
    name: String,
}

impl Logger {
    pub fn new(queue: RecordQueue, level: Level, name: impl Into<String>) -> Self {
        Self { queue, level, name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// `true` if a record at `level` would be kept.
    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level
    }

    pub fn with_field(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Entry<'_> {
        Entry::new(self).with_field(key, value)
    }

    pub fn with_fields<I, K>(&self, fields: I) -> Entry<'_>
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        Entry::new(self).with_fields(fields)
    }

    pub fn with_error(&self, err: &dyn std::error::Error) -> Entry<'_> {
        Entry::new(self).with_error(err)
    }

    pub fn debug(&self, message: impl Display) {
        Entry::new(self).debug(message)
    }

    pub fn info(&self, message: impl Display) {
        Entry::new(self).info(message)
    }

    pub fn warn(&self, message: impl Display) {
        Entry::new(self).warn(message)
    }

    pub fn error(&self, message: impl Display) {
        Entry::new(self).error(message)
    }

    pub fn log(&self, level: Level, fields: Fields, message: impl Display) {
        if !self.enabled(level) {
            return;
        }
        let record = LogRecord::now(level, self.name.clone(), fields, Some(message.to_string()));
        self.queue.submit(record);
    }
}

/// Fields collected for a single record; consumed by the leveled methods.
#[must_use = "an entry does nothing until one of its level methods is called"]
pub struct Entry<'a> {
    logger: &'a Logger,
    fields: Fields,
}

impl<'a> Entry<'a> {
    fn new(logger: &'a Logger) -> Self {
        Self { logger, fields: Fields::new() }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_fields<I, K>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    pub fn with_error(self, err: &dyn std::error::Error) -> Self {
        self.with_field("error", err.to_string())
    }

    pub fn debug(self, message: impl Display) {
        self.logger.log(Level::DEBUG, self.fields, message)
    }

    pub fn info(self, message: impl Display) {
        self.logger.log(Level::INFO, self.fields, message)
    }

    pub fn warn(self, message: impl Display) {
        self.logger.log(Level::WARN, self.fields, message)
    }

    pub fn error(self, message: impl Display) {
        self.logger.log(Level::ERROR, self.fields, message)
    }
}

/// Error returned by [`FlushLoggerBuilder::build`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LoggerError {
    #[error("flush logger requires an inner logger")]
    MissingLogger,

    #[error("flush logger requires a flush handle")]
    MissingFlush,
}

/// A [`Logger`] that can also force delivery of everything it logged.
///
/// All logging methods are reachable through `Deref`.
#[derive(Clone)]
pub struct FlushLogger {
    inner: Logger,
    flusher: FlushHandle,
}

impl FlushLogger {
    pub fn new(inner: Logger, flusher: FlushHandle) -> Self {
        Self { inner, flusher }
    }

    pub fn builder() -> FlushLoggerBuilder {
        FlushLoggerBuilder::default()
    }

    pub fn logger(&self) -> &Logger {
        &self.inner
    }

    /// Block until every record logged so far has been handed to the sink
    /// and the sink has flushed. Safe to call with nothing pending.
    pub async fn flush(&self) -> Result<(), FlushError> {
        self.flusher.flush().await
    }

    /// Run `fut`, then flush, on every exit path.
    ///
    /// If `fut` panics the flush still runs and the panic is resumed
    /// afterwards. If the returned future is dropped before the flush
    /// completed (a cancelled request), the flush is spawned onto the
    /// runtime instead. Otherwise the output of `fut` is returned, unless
    /// the flush itself failed.
    pub async fn flushing<F>(&self, fut: F) -> Result<F::Output, FlushError>
    where
        F: Future,
    {
        let guard = FlushOnDrop { flusher: Some(self.flusher.clone()) };
        let outcome = AssertUnwindSafe(fut).catch_unwind().await;
        let flushed = self.flush().await;
        guard.disarm();
        match outcome {
            Ok(output) => flushed.map(|()| output),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Flushes in the background if dropped while still armed.
struct FlushOnDrop {
    flusher: Option<FlushHandle>,
}

impl FlushOnDrop {
    fn disarm(mut self) {
        self.flusher = None;
    }
}

impl Drop for FlushOnDrop {
    fn drop(&mut self) {
        let Some(flusher) = self.flusher.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = flusher.flush().await {
                        eprintln!("flush after cancelled request failed: {}", e);
                    }
                });
            }
            Err(_) => eprintln!("no runtime to flush after cancelled request"),
        }
    }
}

impl Deref for FlushLogger {
    type Target = Logger;

    fn deref(&self) -> &Logger {
        &self.inner
    }
}

/// Builder that refuses to produce a [`FlushLogger`] without both parts.
#[derive(Default)]
pub struct FlushLoggerBuilder {
    logger: Option<Logger>,
    flusher: Option<FlushHandle>,
}

impl FlushLoggerBuilder {
    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn flusher(mut self, flusher: FlushHandle) -> Self {
        self.flusher = Some(flusher);
        self
    }

    pub fn build(self) -> Result<FlushLogger, LoggerError> {
        let inner = self.logger.ok_or(LoggerError::MissingLogger)?;
        let flusher = self.flusher.ok_or(LoggerError::MissingFlush)?;
        Ok(FlushLogger::new(inner, flusher))
    }
}
