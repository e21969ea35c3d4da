//! One collection cycle's values and rates for one endpoint.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::metric::{EndpointId, MetricId};

/// Immutable per-endpoint result of one collection cycle.
///
/// Built with [`SnapshotBuilder`]; there is no way to change a snapshot after
/// [`SnapshotBuilder::build`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    endpoint: EndpointId,
    values: BTreeMap<MetricId, f64>,
    /// Per-second rates, counter metrics only.
    rates: BTreeMap<MetricId, f64>,
    /// Metrics whose value is a zero substitute for a failed sample.
    stale: BTreeSet<MetricId>,
    /// Unix epoch seconds.
    timestamp: f64,
}

impl Snapshot {
    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn value(&self, metric: MetricId) -> Option<f64> {
        self.values.get(&metric).copied()
    }

    pub fn rate(&self, metric: MetricId) -> Option<f64> {
        self.rates.get(&metric).copied()
    }

    pub fn is_stale(&self, metric: MetricId) -> bool {
        self.stale.contains(&metric)
    }

    /// True when at least one metric failed this cycle.
    pub fn has_stale(&self) -> bool {
        !self.stale.is_empty()
    }

    pub fn values(&self) -> &BTreeMap<MetricId, f64> {
        &self.values
    }

    pub fn rates(&self) -> &BTreeMap<MetricId, f64> {
        &self.rates
    }

    pub fn stale_metrics(&self) -> impl Iterator<Item = MetricId> + '_ {
        self.stale.iter().copied()
    }
}

/// Accumulates one endpoint's metrics during a cycle.
#[derive(Debug)]
pub struct SnapshotBuilder {
    inner: Snapshot,
}

impl SnapshotBuilder {
    pub fn new(endpoint: EndpointId, timestamp: f64) -> Self {
        Self {
            inner: Snapshot {
                endpoint,
                values: BTreeMap::new(),
                rates: BTreeMap::new(),
                stale: BTreeSet::new(),
                timestamp,
            },
        }
    }

    /// Record a gauge value.
    pub fn value(&mut self, metric: MetricId, value: f64) -> &mut Self {
        self.inner.values.insert(metric, value);
        self
    }

    /// Record a counter's raw total and its derived rate.
    pub fn counter(&mut self, metric: MetricId, value: f64, rate: f64) -> &mut Self {
        self.inner.values.insert(metric, value);
        self.inner.rates.insert(metric, rate);
        self
    }

    /// Record a failed sample: zero value, zero rate for counters.
    pub fn stale(&mut self, metric: MetricId) -> &mut Self {
        self.inner.values.insert(metric, 0.0);
        if metric.is_counter() {
            self.inner.rates.insert(metric, 0.0);
        }
        self.inner.stale.insert(metric);
        self
    }

    pub fn build(self) -> Snapshot {
        self.inner
    }
}
