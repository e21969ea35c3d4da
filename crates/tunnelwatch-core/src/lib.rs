//! # tunnelwatch-core
//!
//! **Live telemetry for both ends of a network tunnel.**
//!
//! `tunnelwatch-core` polls a [`MetricSource`] on a fixed interval, turns
//! monotonically increasing byte counters into rates, keeps a bounded
//! history of snapshots and classifies values into severity bands for the
//! dashboard and the HTTP exporter.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tunnelwatch_core::{Collector, MonitorConfig, TelemetryStore, build_router};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> tunnelwatch_core::Result<()> {
//! let config = MonitorConfig::demo();
//! let store = Arc::new(TelemetryStore::new(config.history_capacity)?);
//! let source = Arc::new(build_router(&config)?);
//! let mut collector = Collector::from_config(&config, source, store.clone())?;
//!
//! let cancel = CancellationToken::new();
//! tokio::spawn(async move { collector.run(cancel).await });
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Source → Collector (rates) → TelemetryStore → renderers
//!
//! The [`Collector`] is the only writer. Renderers hold an
//! `Arc<TelemetryStore>` and read [`Snapshot`]s, which never change after
//! they are published.

pub mod classify;
pub mod collector;
pub mod config;
pub mod error;
pub mod metric;
pub mod rate;
pub mod snapshot;
pub mod source;
pub mod sources;
pub mod store;

pub use classify::{Reading, Severity, ThresholdTable, Thresholds, classify, classify_snapshot};
pub use collector::{Collector, DEFAULT_INTERVAL, DEFAULT_SAMPLE_TIMEOUT, unix_secs_now};
pub use config::{EndpointConfig, MonitorConfig, SourceSpec};
pub use error::{ConfigError, Error, Result, SourceError};
pub use metric::{EndpointId, MetricId, MetricKind, MetricValue, Sample};
pub use rate::{CounterState, rate};
pub use snapshot::{Snapshot, SnapshotBuilder};
pub use source::{EndpointRouter, MetricSource};
pub use sources::{build_router, build_source};
pub use store::{DEFAULT_HISTORY_CAPACITY, StoreView, TelemetryStore};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
