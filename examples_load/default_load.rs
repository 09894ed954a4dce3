use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use tracing_flush_sink::init::{init_tracing, LayerConfig};
use tracing_flush_sink::memory_sink::NoopSink;
use tracing_flush_sink::telemetry::Telemetry;

#[tokio::main]
async fn main() {
    let config = LayerConfig { enable_stdout: false, ..LayerConfig::default() };
    let telemetry = Telemetry::connect(Arc::new(NoopSink), config.clone());
    init_tracing(&telemetry, &config).expect("set global subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        info!(iteration = i, "default load test event");
    }
    telemetry.flush().await.expect("flush");

    let elapsed = start.elapsed();
    let stats = telemetry.stats();
    println!("default config: sent {} events in {:?} (~{:.0} ev/s), delivered {}, dropped {}",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64(),
        stats.delivered(),
        stats.dropped(),
    );

    telemetry.close().await.expect("close");
}
