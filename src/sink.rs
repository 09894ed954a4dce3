use crate::record::LogRecord;
use async_trait::async_trait;
use std::error::Error;

/// Error type returned by sink implementations.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Asynchronous destination for [`LogRecord`]s produced by the logger and
/// the tracing layer.
///
/// Implementations are responsible for transporting records to a concrete
/// backend (Datadog, memory, etc). The delivery worker calls both methods
/// from its own task and never on the application thread.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Send one batch of records to the underlying backend.
    ///
    /// **Parameters**
    /// - `records`: non-empty batch, in the order they were logged.
    ///
    /// **Returns**
    /// - `Ok(())` if the whole batch was accepted by the backend.
    /// - `Err(..)` if the backend failed (network error, serialization
    ///   error, HTTP status, etc.). The worker retries the batch with
    ///   backoff a bounded number of times.
    async fn send(&self, records: &[LogRecord]) -> Result<(), BoxError>;

    /// Flush anything the backend keeps buffered on its side.
    ///
    /// Called once per explicit flush, after the pending batch has been
    /// sent. Default implementation is a no-op.
    async fn flush(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Largest batch the backend accepts in one `send`. The worker never
    /// hands over more, so a failed `send` is always retried as a whole.
    fn max_batch_len(&self) -> Option<usize> {
        None
    }
}
