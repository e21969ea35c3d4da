//! Basic collection example.
//!
//! Polls two simulated tunnel endpoints for a few cycles and prints the
//! classified readings of the latest snapshot.
//!
//! Run: `cargo run --example basic`

use std::sync::Arc;
use std::time::Duration;

use tunnelwatch_core::{
    Collector, MetricId, MonitorConfig, Reading, TelemetryStore, build_router, classify_snapshot,
    unix_secs_now,
};

#[tokio::main]
async fn main() -> tunnelwatch_core::Result<()> {
    let config = MonitorConfig::demo();
    let store = Arc::new(TelemetryStore::new(config.history_capacity)?);
    let source = Arc::new(build_router(&config)?);
    let mut collector = Collector::from_config(&config, source, Arc::clone(&store))?;

    // Rates need two samples, so run a few cycles.
    for _ in 0..3 {
        collector.collect_cycle(unix_secs_now()).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let thresholds = config.effective_thresholds();
    for endpoint in config.endpoint_ids() {
        let Some(snapshot) = store.current(&endpoint) else {
            continue;
        };
        println!("{endpoint}");
        for metric in MetricId::ALL {
            match classify_snapshot(&snapshot, metric, &thresholds) {
                Reading::Value { value, severity } => {
                    let band = severity.map(|s| s.to_string()).unwrap_or_default();
                    println!("  {:<16} {value:>14.2} {:<6} {band}", metric.label(), metric.unit());
                }
                Reading::Stale => println!("  {:<16} stale", metric.label()),
                Reading::Missing => {}
            }
        }
    }
    println!("history: {}/{} snapshots", store.len(), store.capacity());
    Ok(())
}
