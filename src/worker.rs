use crate::record::LogRecord;
use crate::sink::{BoxError, LogSink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};

/// Messages consumed by the delivery task, strictly in send order.
pub(crate) enum Command {
    Record(LogRecord),
    Flush(oneshot::Sender<Result<(), FlushError>>),
    Shutdown(oneshot::Sender<Result<(), FlushError>>),
}

/// Error returned by an explicit flush.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FlushError {
    #[error("log delivery worker is not running")]
    WorkerStopped,

    #[error("pending log batch could not be delivered: {0}")]
    Delivery(String),

    #[error("sink flush failed: {0}")]
    Sink(String),

    #[error("{0} log records were lost since the previous flush")]
    Dropped(u64),
}

/// Counters shared between producers and the delivery task.
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Records handed to the queue (accepted or not).
    pub submitted: AtomicU64,
    /// Dropped because the queue was full or closed, or delivery gave up.
    pub dropped: AtomicU64,
    /// Accepted by the sink.
    pub delivered: AtomicU64,
    /// Lost records not yet reported by a flush.
    unreported: AtomicU64,
}

impl QueueStats {
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    fn lose(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
        self.unreported.fetch_add(count, Ordering::AcqRel);
    }

    fn take_unreported(&self) -> u64 {
        self.unreported.swap(0, Ordering::AcqRel)
    }
}

/// Producer side of the delivery queue. Enqueueing never blocks.
#[derive(Clone)]
pub struct RecordQueue {
    sender: mpsc::Sender<Command>,
    stats: Arc<QueueStats>,
}

impl RecordQueue {
    pub fn submit(&self, record: LogRecord) {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        match self.sender.try_send(Command::Record(record)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.stats.lose(1);
                eprintln!("log channel full, dropping log record");
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.lose(1);
                eprintln!("log worker stopped, dropping log record");
            }
        }
    }

    pub fn stats(&self) -> &Arc<QueueStats> {
        &self.stats
    }
}

/// Zero-argument flush bound to one delivery task.
///
/// `flush` resolves once every record enqueued before the call has been
/// handed to the sink and the sink's own `flush` has returned. It fails
/// with [`FlushError::Dropped`] if any record logged since the previous
/// flush was lost, whether on a full queue or in a background delivery.
#[derive(Clone)]
pub struct FlushHandle {
    sender: mpsc::Sender<Command>,
}

impl FlushHandle {
    pub async fn flush(&self) -> Result<(), FlushError> {
        self.request(Command::Flush).await
    }

    pub(crate) async fn shutdown(&self) -> Result<(), FlushError> {
        self.request(Command::Shutdown).await
    }

    async fn request(
        &self,
        command: fn(oneshot::Sender<Result<(), FlushError>>) -> Command,
    ) -> Result<(), FlushError> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(command(ack))
            .await
            .map_err(|_| FlushError::WorkerStopped)?;
        done.await.map_err(|_| FlushError::WorkerStopped)?
    }
}

/// Tunables for the delivery task.
#[derive(Clone, Debug)]
pub(crate) struct WorkerSettings {
    pub buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl WorkerSettings {
    /// Enforce minimal thresholds to avoid degenerate configs, and keep
    /// batches within what the sink accepts in one request.
    fn clamped(self, max_batch: Option<usize>) -> Self {
        let batch_size = match max_batch {
            Some(max) => self.batch_size.min(max),
            None => self.batch_size,
        };
        Self {
            buffer: self.buffer.max(16),
            batch_size: batch_size.max(1),
            flush_interval: self.flush_interval.max(Duration::from_millis(10)),
            ..self
        }
    }
}

/// Spawn the task that pulls commands from a bounded channel and drives
/// the provided [`LogSink`]. Must be called inside a Tokio runtime.
pub(crate) fn spawn(
    sink: Arc<dyn LogSink>,
    settings: WorkerSettings,
) -> (RecordQueue, FlushHandle, JoinHandle<()>) {
    let settings = settings.clamped(sink.max_batch_len());
    let (tx, rx) = mpsc::channel::<Command>(settings.buffer);
    let stats = Arc::new(QueueStats::default());

    let handle = tokio::spawn(run(sink, rx, settings, Arc::clone(&stats)));

    (
        RecordQueue { sender: tx.clone(), stats },
        FlushHandle { sender: tx },
        handle,
    )
}

async fn run(
    sink: Arc<dyn LogSink>,
    mut rx: mpsc::Receiver<Command>,
    settings: WorkerSettings,
    stats: Arc<QueueStats>,
) {
    let mut batch = Vec::with_capacity(settings.batch_size);
    let mut ticker = interval(settings.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Record(record)) => {
                    batch.push(record);
                    if batch.len() >= settings.batch_size {
                        if let Err(e) = deliver(&*sink, &mut batch, &settings, &stats).await {
                            eprintln!("error sending log batch: {}", e);
                        }
                    }
                }
                Some(Command::Flush(ack)) => {
                    let _ = ack.send(flush(&*sink, &mut batch, &settings, &stats).await);
                }
                Some(Command::Shutdown(ack)) => {
                    let _ = ack.send(flush(&*sink, &mut batch, &settings, &stats).await);
                    break;
                }
                None => {
                    if let Err(e) = flush(&*sink, &mut batch, &settings, &stats).await {
                        eprintln!("error flushing log batch on close: {}", e);
                    }
                    break;
                }
            },
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    if let Err(e) = deliver(&*sink, &mut batch, &settings, &stats).await {
                        eprintln!("error flushing log batch: {}", e);
                    }
                }
            }
        }
    }
}

async fn flush(
    sink: &dyn LogSink,
    batch: &mut Vec<LogRecord>,
    settings: &WorkerSettings,
    stats: &QueueStats,
) -> Result<(), FlushError> {
    let delivered = if batch.is_empty() {
        Ok(())
    } else {
        deliver(sink, batch, settings, stats)
            .await
            .map_err(|e| FlushError::Delivery(e.to_string()))
    };
    // Reported once: either as the failed pending batch or as a count.
    let lost = stats.take_unreported();
    delivered?;
    sink.flush().await.map_err(|e| FlushError::Sink(e.to_string()))?;
    if lost > 0 {
        return Err(FlushError::Dropped(lost));
    }
    Ok(())
}

/// Send the batch, retrying with exponential backoff. The batch is always
/// empty afterwards; records that could not be delivered are counted as
/// lost and reported by the next flush.
async fn deliver(
    sink: &dyn LogSink,
    batch: &mut Vec<LogRecord>,
    settings: &WorkerSettings,
    stats: &QueueStats,
) -> Result<(), BoxError> {
    let mut backoff = settings.initial_backoff;
    let mut attempt = 0;

    loop {
        match sink.send(batch.as_slice()).await {
            Ok(()) => {
                stats.delivered.fetch_add(batch.len() as u64, Ordering::Relaxed);
                batch.clear();
                return Ok(());
            }
            Err(e) if attempt >= settings.max_retries => {
                stats.lose(batch.len() as u64);
                batch.clear();
                return Err(e);
            }
            Err(_) => {
                eprintln!("log sink send failed, retrying in {:?}", backoff);
                sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, settings.max_backoff);
                attempt += 1;
            }
        }
    }
}
