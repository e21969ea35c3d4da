//! Severity bands for display.
//!
//! A value is classified against a `(warn, critical)` pair. Renderers pick a
//! color from the band; the classifier itself knows nothing about colors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::metric::MetricId;
use crate::snapshot::Snapshot;

/// Severity band of a classified value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Normal,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Map `value` to a band. Inclusive at both thresholds.
pub fn classify(value: f64, warn_threshold: f64, critical_threshold: f64) -> Severity {
    if value >= critical_threshold {
        Severity::Critical
    } else if value >= warn_threshold {
        Severity::Warning
    } else {
        Severity::Normal
    }
}

/// A metric's warn/critical pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub warn: f64,
    pub critical: f64,
}

impl Thresholds {
    pub const fn new(warn: f64, critical: f64) -> Self {
        Self { warn, critical }
    }

    pub fn classify(&self, value: f64) -> Severity {
        classify(value, self.warn, self.critical)
    }

    pub fn validate(&self, metric: MetricId) -> Result<(), ConfigError> {
        if !self.warn.is_finite() || !self.critical.is_finite() || self.warn > self.critical {
            return Err(ConfigError::InvalidThresholds {
                metric,
                warn: self.warn,
                critical: self.critical,
            });
        }
        Ok(())
    }
}

/// Per-metric thresholds. Metrics without an entry are never classified.
///
/// Counter metrics are classified on their rate (bytes/s), gauges on their
/// value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Thresholds>",
    into = "BTreeMap<String, Thresholds>"
)]
pub struct ThresholdTable(BTreeMap<MetricId, Thresholds>);

impl TryFrom<BTreeMap<String, Thresholds>> for ThresholdTable {
    type Error = String;

    fn try_from(raw: BTreeMap<String, Thresholds>) -> Result<Self, Self::Error> {
        raw.into_iter()
            .map(|(k, t)| Ok((k.parse::<MetricId>()?, t)))
            .collect::<Result<BTreeMap<_, _>, String>>()
            .map(Self)
    }
}

impl From<ThresholdTable> for BTreeMap<String, Thresholds> {
    fn from(table: ThresholdTable) -> Self {
        table
            .0
            .into_iter()
            .map(|(m, t)| (m.name().to_string(), t))
            .collect()
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        let mut t = BTreeMap::new();
        t.insert(MetricId::CpuPercent, Thresholds::new(60.0, 80.0));
        t.insert(MetricId::MemoryPercent, Thresholds::new(60.0, 80.0));
        t.insert(MetricId::LatencyMs, Thresholds::new(100.0, 250.0));
        t.insert(MetricId::ActiveConnections, Thresholds::new(500.0, 1000.0));
        Self(t)
    }
}

impl ThresholdTable {
    /// Table with no thresholds at all.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, metric: MetricId) -> Option<Thresholds> {
        self.0.get(&metric).copied()
    }

    pub fn set(&mut self, metric: MetricId, thresholds: Thresholds) {
        self.0.insert(metric, thresholds);
    }

    /// Overlay `other` on top of `self`; entries in `other` win.
    pub fn merged(mut self, other: &ThresholdTable) -> Self {
        for (m, t) in &other.0 {
            self.0.insert(*m, *t);
        }
        self
    }

    pub fn classify(&self, metric: MetricId, value: f64) -> Option<Severity> {
        self.get(metric).map(|t| t.classify(value))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.0.iter().try_for_each(|(m, t)| t.validate(*m))
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricId, Thresholds)> + '_ {
        self.0.iter().map(|(m, t)| (*m, *t))
    }
}

/// What a renderer should show for one metric of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Metric not part of the snapshot.
    Missing,
    /// The source failed this cycle; the stored value is a zero substitute.
    Stale,
    Value {
        /// Gauge value, or the rate for counters.
        value: f64,
        severity: Option<Severity>,
    },
}

impl Reading {
    pub fn severity(&self) -> Option<Severity> {
        match self {
            Self::Value { severity, .. } => *severity,
            _ => None,
        }
    }
}

/// Classify one metric of a snapshot.
pub fn classify_snapshot(snapshot: &Snapshot, metric: MetricId, table: &ThresholdTable) -> Reading {
    if snapshot.is_stale(metric) {
        return Reading::Stale;
    }
    let value = if metric.is_counter() {
        snapshot.rate(metric)
    } else {
        snapshot.value(metric)
    };
    match value {
        Some(value) => Reading::Value {
            value,
            severity: table.classify(metric, value),
        },
        None => Reading::Missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::EndpointId;
    use crate::snapshot::SnapshotBuilder;

    #[test]
    fn bands_are_inclusive_at_thresholds() {
        assert_eq!(classify(59.9, 60.0, 80.0), Severity::Normal);
        assert_eq!(classify(60.0, 60.0, 80.0), Severity::Warning);
        assert_eq!(classify(79.9, 60.0, 80.0), Severity::Warning);
        assert_eq!(classify(80.0, 60.0, 80.0), Severity::Critical);
        assert_eq!(classify(1e12, 60.0, 80.0), Severity::Critical);
    }

    #[test]
    fn classify_is_monotonic() {
        let mut last = Severity::Normal;
        for i in 0..=2000 {
            let s = classify(i as f64 * 0.1, 60.0, 80.0);
            assert!(s >= last, "band went down at {}", i as f64 * 0.1);
            last = s;
        }
        assert_eq!(last, Severity::Critical);
    }

    #[test]
    fn equal_thresholds_skip_warning() {
        assert_eq!(classify(49.0, 50.0, 50.0), Severity::Normal);
        assert_eq!(classify(50.0, 50.0, 50.0), Severity::Critical);
    }

    #[test]
    fn thresholds_validation() {
        assert!(Thresholds::new(60.0, 80.0).validate(MetricId::CpuPercent).is_ok());
        assert!(Thresholds::new(80.0, 60.0).validate(MetricId::CpuPercent).is_err());
        assert!(
            Thresholds::new(f64::NAN, 60.0)
                .validate(MetricId::CpuPercent)
                .is_err()
        );
    }

    #[test]
    fn default_table_covers_resource_gauges() {
        let t = ThresholdTable::default();
        assert_eq!(t.classify(MetricId::CpuPercent, 85.0), Some(Severity::Critical));
        assert_eq!(t.classify(MetricId::MemoryPercent, 65.0), Some(Severity::Warning));
        assert_eq!(t.classify(MetricId::BytesIn, 1e9), None);
    }

    #[test]
    fn merged_overrides_entries() {
        let mut custom = ThresholdTable::empty();
        custom.set(MetricId::CpuPercent, Thresholds::new(90.0, 95.0));
        let t = ThresholdTable::default().merged(&custom);
        assert_eq!(t.classify(MetricId::CpuPercent, 85.0), Some(Severity::Normal));
        assert_eq!(t.classify(MetricId::MemoryPercent, 85.0), Some(Severity::Critical));
    }

    #[test]
    fn table_deserializes_from_metric_names() {
        let t: ThresholdTable =
            serde_json::from_str(r#"{"latency_ms": {"warn": 20.0, "critical": 50.0}}"#).unwrap();
        assert_eq!(t.get(MetricId::LatencyMs), Some(Thresholds::new(20.0, 50.0)));
        let unknown = r#"{"jitter": {"warn": 1.0, "critical": 2.0}}"#;
        assert!(serde_json::from_str::<ThresholdTable>(unknown).is_err());
    }

    #[test]
    fn snapshot_readings_distinguish_stale_and_missing() {
        let mut b = SnapshotBuilder::new(EndpointId::new("server"), 100.0);
        b.value(MetricId::CpuPercent, 70.0);
        b.stale(MetricId::MemoryPercent);
        b.counter(MetricId::BytesIn, 5000.0, 250.0);
        let snap = b.build();

        let table = ThresholdTable::default();
        assert_eq!(
            classify_snapshot(&snap, MetricId::CpuPercent, &table),
            Reading::Value {
                value: 70.0,
                severity: Some(Severity::Warning)
            }
        );
        assert_eq!(
            classify_snapshot(&snap, MetricId::MemoryPercent, &table),
            Reading::Stale
        );
        assert_eq!(
            classify_snapshot(&snap, MetricId::LatencyMs, &table),
            Reading::Missing
        );
        assert_eq!(
            classify_snapshot(&snap, MetricId::BytesIn, &table),
            Reading::Value {
                value: 250.0,
                severity: None
            }
        );
    }
}
