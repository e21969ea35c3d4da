//! Metric and endpoint identifiers plus the typed values a source returns.
//!
//! The metric set is closed: every [`MetricId`] is known at compile time and
//! carries a fixed [`MetricKind`]. Counters (cumulative byte totals) have a
//! rate derived from successive samples; gauges are reported as-is.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// How a metric's value evolves over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Monotonically increasing total; a rate is derived by differencing.
    Counter,
    /// Instantaneous measurement, no rate derivation.
    Gauge,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter => write!(f, "counter"),
            Self::Gauge => write!(f, "gauge"),
        }
    }
}

/// A measured quantity on a tunnel endpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MetricId {
    /// Total bytes received by the tunnel.
    BytesIn,
    /// Total bytes sent by the tunnel.
    BytesOut,
    /// Currently open tunnel connections.
    ActiveConnections,
    /// Process/host CPU usage in percent.
    CpuPercent,
    /// Process/host memory usage in percent.
    MemoryPercent,
    /// Round-trip latency to the peer in milliseconds.
    LatencyMs,
}

impl MetricId {
    /// Every metric, in display order.
    pub const ALL: [MetricId; 6] = [
        Self::BytesIn,
        Self::BytesOut,
        Self::ActiveConnections,
        Self::CpuPercent,
        Self::MemoryPercent,
        Self::LatencyMs,
    ];

    pub fn kind(self) -> MetricKind {
        match self {
            Self::BytesIn | Self::BytesOut => MetricKind::Counter,
            Self::ActiveConnections | Self::CpuPercent | Self::MemoryPercent | Self::LatencyMs => {
                MetricKind::Gauge
            }
        }
    }

    pub fn is_counter(self) -> bool {
        self.kind() == MetricKind::Counter
    }

    /// Stable snake_case name, identical to the serialized form.
    pub fn name(self) -> &'static str {
        match self {
            Self::BytesIn => "bytes_in",
            Self::BytesOut => "bytes_out",
            Self::ActiveConnections => "active_connections",
            Self::CpuPercent => "cpu_percent",
            Self::MemoryPercent => "memory_percent",
            Self::LatencyMs => "latency_ms",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::BytesIn => "Bytes In",
            Self::BytesOut => "Bytes Out",
            Self::ActiveConnections => "Active Connections",
            Self::CpuPercent => "CPU Usage",
            Self::MemoryPercent => "Memory Usage",
            Self::LatencyMs => "Latency",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::BytesIn | Self::BytesOut => "bytes",
            Self::ActiveConnections => "count",
            Self::CpuPercent | Self::MemoryPercent => "pct",
            Self::LatencyMs => "ms",
        }
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetricId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|m| m.name() == wanted)
            .ok_or_else(|| format!("unknown metric '{s}'"))
    }
}

/// Identifies a monitored peer (`"server"`, `"client"`, ...).
///
/// Cloning is a refcount bump; endpoint ids are copied into every snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(Arc<str>);

impl EndpointId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EndpointId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl AsRef<str> for EndpointId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Typed value returned by a [`MetricSource`](crate::source::MetricSource).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(u64),
    Float(f64),
}

impl MetricValue {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Counter(v) | Self::Gauge(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

/// One polled value. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub endpoint: EndpointId,
    pub metric: MetricId,
    pub value: f64,
    /// Unix epoch seconds.
    pub collected_at: f64,
    /// Set when the source failed and `value` is the zero substitute.
    pub stale: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_byte_totals_are_counters() {
        let counters: Vec<_> = MetricId::ALL.into_iter().filter(|m| m.is_counter()).collect();
        assert_eq!(counters, vec![MetricId::BytesIn, MetricId::BytesOut]);
        assert_eq!(MetricId::LatencyMs.kind(), MetricKind::Gauge);
    }

    #[test]
    fn metric_name_round_trips_through_from_str() {
        for m in MetricId::ALL {
            assert_eq!(m.name().parse::<MetricId>().unwrap(), m);
        }
        assert_eq!("CPU-percent".parse::<MetricId>().unwrap(), MetricId::CpuPercent);
        assert!("throughput".parse::<MetricId>().is_err());
    }

    #[test]
    fn serialized_name_matches_name() {
        for m in MetricId::ALL {
            let json = serde_json::to_string(&m).unwrap();
            assert_eq!(json, format!("\"{}\"", m.name()));
        }
    }

    #[test]
    fn endpoint_id_serializes_as_plain_string() {
        let id = EndpointId::new("server");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"server\"");
        assert_eq!(id.to_string(), "server");
        assert_eq!(id, EndpointId::from(String::from("server")));
    }

    #[test]
    fn metric_value_converts_to_f64() {
        assert_eq!(MetricValue::Counter(1500).as_f64(), 1500.0);
        assert_eq!(MetricValue::Gauge(42).as_f64(), 42.0);
        assert_eq!(MetricValue::Float(12.5).as_f64(), 12.5);
    }
}
