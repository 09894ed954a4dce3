use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;

use tracing_flush_sink::init::LayerConfig;
use tracing_flush_sink::memory_sink::NoopSink;
use tracing_flush_sink::telemetry::Telemetry;

/// Drives the flush logger directly, flushing every `flush_every` records
/// the way a request handler would.
#[tokio::main]
async fn main() {
    let layer_config = LayerConfig {
        channel_buffer: 50_000,
        batch_size: 1_000,
        flush_interval: Duration::from_millis(200),
        enable_stdout: false,
        ..LayerConfig::default()
    };
    let telemetry = Telemetry::connect(Arc::new(NoopSink), layer_config);
    let log = telemetry.flush_logger("load");

    let n: u64 = 100_000;
    let flush_every: u64 = 100;
    let start = Instant::now();

    for i in 0..n {
        log.with_field("iteration", i).info("custom load test event");
        if i % flush_every == flush_every - 1 {
            log.flush().await.expect("flush");
        }
    }

    let elapsed = start.elapsed();
    println!("custom config: sent {} events with {} flushes in {:?} (~{:.0} ev/s)",
        n,
        n / flush_every,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    telemetry.close().await.expect("close");
}
