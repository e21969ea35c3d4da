//! Thread-safe current + historical telemetry state.
//!
//! Architecture:
//! 1. The collector is the only writer; it publishes whole snapshots
//! 2. Current snapshot per endpoint and the shared history ring live behind
//!    one lock, so a publish is observed all-or-nothing
//! 3. Snapshots are stored as `Arc`, readers copy pointers, never data
//! 4. The history ring has a fixed capacity and evicts oldest-first

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::error::ConfigError;
use crate::metric::EndpointId;
use crate::snapshot::Snapshot;

/// Default retention in snapshots. The ring is shared, so with two endpoints
/// at 1 Hz this covers two and a half minutes of each.
pub const DEFAULT_HISTORY_CAPACITY: usize = 300;

/// Fixed-capacity FIFO of snapshots, oldest first.
#[derive(Debug, Clone)]
pub(crate) struct History {
    entries: VecDeque<Arc<Snapshot>>,
    capacity: usize,
}

impl History {
    /// `capacity` must be non-zero; [`TelemetryStore::new`] checks this.
    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, snapshot: Arc<Snapshot>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Arc<Snapshot>> {
        self.entries.iter()
    }
}

struct StoreInner {
    current: BTreeMap<EndpointId, Arc<Snapshot>>,
    history: History,
    cycles: u64,
}

/// Authoritative current and historical snapshots.
///
/// Share it as `Arc<TelemetryStore>` between the collector and every
/// renderer.
pub struct TelemetryStore {
    inner: RwLock<StoreInner>,
}

/// Point-in-time copy of the whole store, captured under a single read lock.
///
/// Serializes to `{ "current": { <endpoint>: Snapshot }, "history": [...] }`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreView {
    pub current: BTreeMap<EndpointId, Arc<Snapshot>>,
    pub history: Vec<Arc<Snapshot>>,
    #[serde(skip)]
    pub cycles: u64,
}

impl StoreView {
    /// Snapshots in `history` belonging to `endpoint`, oldest first.
    pub fn history_for<'a>(
        &'a self,
        endpoint: &'a EndpointId,
    ) -> impl Iterator<Item = &'a Arc<Snapshot>> + 'a {
        self.history.iter().filter(move |s| s.endpoint() == endpoint)
    }
}

impl TelemetryStore {
    pub fn new(history_capacity: usize) -> Result<Self, ConfigError> {
        if history_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Self {
            inner: RwLock::new(StoreInner {
                current: BTreeMap::new(),
                history: History::with_capacity(history_capacity),
                cycles: 0,
            }),
        })
    }

    /// Replace the endpoint's current snapshot and append it to history.
    pub fn publish(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        let mut inner = self.inner.write();
        inner
            .current
            .insert(snapshot.endpoint().clone(), Arc::clone(&snapshot));
        inner.history.push(snapshot);
        inner.cycles += 1;
    }

    /// Publish every endpoint's snapshot of one cycle as a single update.
    pub fn publish_cycle(&self, snapshots: Vec<Snapshot>) {
        if snapshots.is_empty() {
            return;
        }
        let snapshots: Vec<Arc<Snapshot>> = snapshots.into_iter().map(Arc::new).collect();
        let mut inner = self.inner.write();
        for snapshot in snapshots {
            inner
                .current
                .insert(snapshot.endpoint().clone(), Arc::clone(&snapshot));
            inner.history.push(snapshot);
        }
        inner.cycles += 1;
    }

    /// Latest snapshot for `endpoint`, `None` before its first cycle.
    pub fn current(&self, endpoint: &EndpointId) -> Option<Arc<Snapshot>> {
        self.inner.read().current.get(endpoint).cloned()
    }

    /// Copy of the history, oldest first.
    pub fn history(&self) -> Vec<Arc<Snapshot>> {
        self.inner.read().history.iter().cloned().collect()
    }

    /// Copy of one endpoint's history, oldest first.
    pub fn history_for(&self, endpoint: &EndpointId) -> Vec<Arc<Snapshot>> {
        self.inner
            .read()
            .history
            .iter()
            .filter(|s| s.endpoint() == endpoint)
            .cloned()
            .collect()
    }

    /// Current snapshots and history from the same instant.
    pub fn view(&self) -> StoreView {
        let inner = self.inner.read();
        StoreView {
            current: inner.current.clone(),
            history: inner.history.iter().cloned().collect(),
            cycles: inner.cycles,
        }
    }

    /// Endpoints that have published at least once.
    pub fn endpoints(&self) -> Vec<EndpointId> {
        self.inner.read().current.keys().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.inner.read().history.capacity()
    }

    pub fn len(&self) -> usize {
        self.inner.read().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().history.is_empty()
    }

    /// Number of publish operations so far.
    pub fn cycles(&self) -> u64 {
        self.inner.read().cycles
    }
}

impl std::fmt::Debug for TelemetryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("TelemetryStore")
            .field("endpoints", &inner.current.len())
            .field("history", &inner.history.len())
            .field("capacity", &inner.history.capacity())
            .field("cycles", &inner.cycles)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::MetricId;
    use crate::snapshot::SnapshotBuilder;

    fn snap(endpoint: &str, ts: f64) -> Snapshot {
        let mut b = SnapshotBuilder::new(EndpointId::new(endpoint), ts);
        b.value(MetricId::CpuPercent, ts);
        b.build()
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            TelemetryStore::new(0),
            Err(ConfigError::ZeroCapacity)
        ));
    }

    #[test]
    fn current_is_absent_before_first_publish() {
        let store = TelemetryStore::new(10).unwrap();
        assert!(store.current(&EndpointId::new("server")).is_none());
        assert!(store.history().is_empty());
        assert_eq!(store.cycles(), 0);
    }

    #[test]
    fn publish_replaces_current_and_appends() {
        let store = TelemetryStore::new(10).unwrap();
        store.publish(snap("server", 1.0));
        store.publish(snap("server", 2.0));
        let cur = store.current(&EndpointId::new("server")).unwrap();
        assert_eq!(cur.timestamp(), 2.0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn current_is_idempotent_between_publishes() {
        let store = TelemetryStore::new(10).unwrap();
        store.publish(snap("server", 1.0));
        let id = EndpointId::new("server");
        let a = store.current(&id).unwrap();
        let b = store.current(&id).unwrap();
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn history_evicts_oldest_at_capacity() {
        let store = TelemetryStore::new(300).unwrap();
        for i in 1..=301 {
            store.publish(snap("server", i as f64));
        }
        let history = store.history();
        assert_eq!(history.len(), 300);
        assert_eq!(history.first().unwrap().timestamp(), 2.0);
        assert_eq!(history.last().unwrap().timestamp(), 301.0);
        assert!(
            history
                .windows(2)
                .all(|w| w[0].timestamp() < w[1].timestamp())
        );
    }

    #[test]
    fn history_never_exceeds_capacity() {
        for cap in [1, 2, 7] {
            let store = TelemetryStore::new(cap).unwrap();
            for i in 0..50 {
                store.publish(snap("client", i as f64));
                assert!(store.len() <= cap);
            }
            let h = store.history();
            let expected: Vec<f64> = (50 - cap..50).map(|i| i as f64).collect();
            let got: Vec<f64> = h.iter().map(|s| s.timestamp()).collect();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn publish_cycle_updates_all_endpoints_together() {
        let store = TelemetryStore::new(10).unwrap();
        store.publish_cycle(vec![snap("server", 1.0), snap("client", 1.0)]);
        assert_eq!(store.cycles(), 1);
        assert_eq!(store.endpoints().len(), 2);
        assert_eq!(store.history_for(&EndpointId::new("client")).len(), 1);

        store.publish_cycle(Vec::new());
        assert_eq!(store.cycles(), 1);
    }

    #[test]
    fn view_serializes_current_and_history() {
        let store = TelemetryStore::new(10).unwrap();
        store.publish_cycle(vec![snap("server", 1.0), snap("client", 1.0)]);
        store.publish_cycle(vec![snap("server", 2.0), snap("client", 2.0)]);
        let view = store.view();
        assert_eq!(view.cycles, 2);
        assert_eq!(view.history_for(&EndpointId::new("server")).count(), 2);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["current"]["server"]["timestamp"], 2.0);
        assert_eq!(json["current"]["client"]["values"]["cpu_percent"], 2.0);
        assert_eq!(json["history"].as_array().unwrap().len(), 4);
        assert!(json.get("cycles").is_none());
    }

    #[test]
    fn concurrent_readers_see_whole_cycles() {
        let store = Arc::new(TelemetryStore::new(64).unwrap());
        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..2000 {
                    store.publish_cycle(vec![snap("server", i as f64), snap("client", i as f64)]);
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..2000 {
                        let view = store.view();
                        assert!(view.history.len() <= 64);
                        if let (Some(s), Some(c)) = (
                            view.current.get(&EndpointId::new("server")),
                            view.current.get(&EndpointId::new("client")),
                        ) {
                            assert_eq!(s.timestamp(), c.timestamp());
                        }
                    }
                })
            })
            .collect();
        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(store.len(), 64);
    }
}
