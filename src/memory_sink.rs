use crate::record::LogRecord;
use crate::sink::{BoxError, LogSink};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A sink that simply drops all records.
///
/// Useful for measuring the overhead of the queue and worker without any
/// external I/O.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    async fn send(&self, _records: &[LogRecord]) -> Result<(), BoxError> {
        Ok(())
    }
}

/// What a [`MemorySink`] observed, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    /// A batch of this many records was accepted.
    Sent(usize),
    /// `flush` was called.
    Flushed,
}

/// In-process sink that keeps every delivered record.
///
/// The journal makes the ordering between batches and flushes observable,
/// which is what tests around the flush contract need.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
    journal: Mutex<Vec<SinkEvent>>,
    fail_sends: AtomicBool,
    max_batch: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise a batch limit to the delivery worker.
    pub fn with_max_batch(mut self, max: usize) -> Self {
        self.max_batch = Some(max);
        self
    }

    /// Make every following `send` fail until switched back off.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<LogRecord> {
        lock(&self.records).clone()
    }

    pub fn journal(&self) -> Vec<SinkEvent> {
        lock(&self.journal).clone()
    }

    pub fn flush_count(&self) -> usize {
        lock(&self.journal)
            .iter()
            .filter(|event| **event == SinkEvent::Flushed)
            .count()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LogSink for MemorySink {
    async fn send(&self, records: &[LogRecord]) -> Result<(), BoxError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err("memory sink configured to fail".into());
        }
        lock(&self.records).extend_from_slice(records);
        lock(&self.journal).push(SinkEvent::Sent(records.len()));
        Ok(())
    }

    async fn flush(&self) -> Result<(), BoxError> {
        lock(&self.journal).push(SinkEvent::Flushed);
        Ok(())
    }

    fn max_batch_len(&self) -> Option<usize> {
        self.max_batch
    }
}
