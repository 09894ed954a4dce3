use crate::telemetry::Telemetry;
use tokio::time::Duration;
use tracing::dispatcher::SetGlobalDefaultError;
use tracing::{Dispatch, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Конфигурация доставки логов.
///
/// Управляет размером внутренней очереди, максимальным размером батча
/// при отправке в sink, частотой фоновой отправки, числом повторов,
/// минимальным уровнем и тем, нужно ли дополнительно печатать события
/// в консоль через `fmt`‑слой.
///
/// **Поля**
/// - `channel_buffer`: максимальное число записей в очереди до начала
///   дропа новых записей.
/// - `batch_size`: размер батча для отправки в sink.
/// - `flush_interval`: максимальный интервал между отправками даже при
///   неполном батче.
/// - `max_retries`: сколько раз повторять неудачную отправку батча.
/// - `min_level`: самый подробный уровень, который ещё уходит в sink.
/// - `enable_stdout`: если `true`, поверх [`SinkLayer`](crate::layer::SinkLayer)
///   добавляется `tracing_subscriber::fmt::Layer`.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_retries: u32,
    pub min_level: Level,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            max_retries: 3,
            min_level: Level::INFO,
            enable_stdout: true,
        }
    }
}

/// `RUST_LOG`, or `info` when unset or unparsable.
fn stdout_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Subscriber that only prints to stdout. Used before any sink exists.
pub fn stdout_dispatch() -> Dispatch {
    let subscriber = Registry::default().with(tracing_subscriber::fmt::layer().with_filter(stdout_filter()));
    Dispatch::new(subscriber)
}

/// Compose the [`SinkLayer`](crate::layer::SinkLayer) of `telemetry` with
/// an optional stdout layer.
///
/// The sink layer applies its own `min_level`; the stdout layer follows
/// `RUST_LOG`.
pub fn build_dispatch(telemetry: &Telemetry, config: &LayerConfig) -> Dispatch {
    let fmt_layer = config
        .enable_stdout
        .then(|| tracing_subscriber::fmt::layer().with_filter(stdout_filter()));
    let subscriber = Registry::default().with(telemetry.layer()).with(fmt_layer);
    Dispatch::new(subscriber)
}

/// Install [`build_dispatch`] as the process-wide default subscriber.
///
/// **Effects**
///
/// All `tracing` events in the process are observed by the sink layer
/// from here on. Fails if a global subscriber was already set.
pub fn init_tracing(telemetry: &Telemetry, config: &LayerConfig) -> Result<(), SetGlobalDefaultError> {
    tracing::dispatcher::set_global_default(build_dispatch(telemetry, config))
}
