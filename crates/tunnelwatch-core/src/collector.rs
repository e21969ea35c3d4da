//! Polling loop: sample every (endpoint, metric) pair on a fixed interval,
//! derive counter rates, publish one snapshot per endpoint.
//!
//! Design: all samples of a cycle are requested concurrently, each under its
//! own timeout, so an unreachable endpoint costs one timeout per cycle rather
//! than one per metric. Failed samples become stale zeros; nothing that
//! happens during a cycle stops the loop. Counter baselines are only touched
//! after every sample of the cycle has come back, so a cycle abandoned on
//! cancellation leaves no trace.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::future::join_all;
use log::{debug, info, warn};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::error::{ConfigError, SourceError};
use crate::metric::{EndpointId, MetricId, Sample};
use crate::rate::{CounterState, rate};
use crate::snapshot::{Snapshot, SnapshotBuilder};
use crate::source::MetricSource;
use crate::store::TelemetryStore;

/// Default polling cadence.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Default per-sample deadline.
pub const DEFAULT_SAMPLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Current wall-clock time as Unix epoch seconds.
pub fn unix_secs_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Sole writer of a [`TelemetryStore`].
pub struct Collector {
    endpoints: Vec<EndpointId>,
    metrics: Vec<MetricId>,
    interval: Duration,
    sample_timeout: Duration,
    source: Arc<dyn MetricSource>,
    store: Arc<TelemetryStore>,
    counters: HashMap<(EndpointId, MetricId), CounterState>,
    /// Pairs whose last sample failed; used to log transitions only.
    failing: HashSet<(EndpointId, MetricId)>,
}

impl Collector {
    /// Collector over `endpoints` × `metrics` with default timing.
    ///
    /// Both sets must be non-empty; duplicates are dropped.
    pub fn new(
        endpoints: Vec<EndpointId>,
        metrics: Vec<MetricId>,
        source: Arc<dyn MetricSource>,
        store: Arc<TelemetryStore>,
    ) -> Result<Self, ConfigError> {
        if endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        if metrics.is_empty() {
            return Err(ConfigError::NoMetrics);
        }
        let mut seen = HashSet::new();
        let endpoints: Vec<EndpointId> = endpoints
            .into_iter()
            .filter(|e| seen.insert(e.clone()))
            .collect();
        let mut seen = HashSet::new();
        let metrics: Vec<MetricId> = metrics.into_iter().filter(|m| seen.insert(*m)).collect();

        Ok(Self {
            endpoints,
            metrics,
            interval: DEFAULT_INTERVAL,
            sample_timeout: DEFAULT_SAMPLE_TIMEOUT,
            source,
            store,
            counters: HashMap::new(),
            failing: HashSet::new(),
        })
    }

    /// Collector configured from a validated [`MonitorConfig`].
    pub fn from_config(
        config: &MonitorConfig,
        source: Arc<dyn MetricSource>,
        store: Arc<TelemetryStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::new(config.endpoint_ids(), config.metrics.clone(), source, store)?
            .with_interval(config.interval())?
            .with_sample_timeout(config.sample_timeout())
    }

    /// Polling cadence; must be non-zero.
    pub fn with_interval(mut self, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        self.interval = interval;
        Ok(self)
    }

    /// Per-sample deadline; must be non-zero.
    pub fn with_sample_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        self.sample_timeout = timeout;
        Ok(self)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn endpoints(&self) -> &[EndpointId] {
        &self.endpoints
    }

    pub fn metrics(&self) -> &[MetricId] {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<TelemetryStore> {
        &self.store
    }

    /// Baseline for a counter pair, if one has been recorded yet.
    pub fn counter_state(&self, endpoint: &EndpointId, metric: MetricId) -> Option<CounterState> {
        self.counters.get(&(endpoint.clone(), metric)).copied()
    }

    /// Poll until `cancel` fires.
    ///
    /// Sleeps only for what is left of the interval after a cycle; a cycle
    /// that overruns is followed immediately by the next one. Cancellation
    /// during a cycle drops that cycle unpublished.
    pub async fn run(&mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "collector started: {} endpoint(s) x {} metric(s) every {:?} via {}",
            self.endpoints.len(),
            self.metrics.len(),
            self.interval,
            self.source.name()
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let at = unix_secs_now();
            let snapshots = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("cancelled mid-cycle, discarding partial results");
                    break;
                }
                snapshots = self.poll_cycle(at) => snapshots,
            };
            self.store.publish_cycle(snapshots);
        }

        info!("collector stopped after {} cycle(s)", self.store.cycles());
    }

    /// Run exactly one cycle stamped `at` (Unix epoch seconds) and publish it.
    ///
    /// Returns the number of snapshots published.
    pub async fn collect_cycle(&mut self, at: f64) -> usize {
        let snapshots = self.poll_cycle(at).await;
        let n = snapshots.len();
        self.store.publish_cycle(snapshots);
        n
    }

    /// Query every pair and fold the results into per-endpoint snapshots.
    async fn poll_cycle(&mut self, at: f64) -> Vec<Snapshot> {
        let samples = self.sample_all(at).await;
        self.build_snapshots(at, &samples)
    }

    async fn sample_all(&mut self, at: f64) -> Vec<Sample> {
        let timeout = self.sample_timeout;
        let source = &self.source;

        let queries = self.endpoints.iter().flat_map(|endpoint| {
            self.metrics.iter().map(move |&metric| async move {
                let result = match tokio::time::timeout(timeout, source.sample(endpoint, metric))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(SourceError::Timeout),
                };
                (endpoint, metric, result)
            })
        });
        let results = join_all(queries).await;

        let mut samples = Vec::with_capacity(results.len());
        let mut failed = Vec::new();
        let mut recovered = Vec::new();
        for (endpoint, metric, result) in results {
            let key = (endpoint.clone(), metric);
            let sample = match result {
                Ok(value) => {
                    if self.failing.contains(&key) {
                        recovered.push(key);
                    }
                    Sample {
                        endpoint: endpoint.clone(),
                        metric,
                        value: value.as_f64(),
                        collected_at: at,
                        stale: false,
                    }
                }
                Err(e) => {
                    if self.failing.contains(&key) {
                        debug!("{endpoint}/{metric}: still failing: {e}");
                    } else {
                        warn!("{endpoint}/{metric}: sample failed: {e}");
                    }
                    failed.push(key);
                    Sample {
                        endpoint: endpoint.clone(),
                        metric,
                        value: 0.0,
                        collected_at: at,
                        stale: true,
                    }
                }
            };
            samples.push(sample);
        }

        for key in recovered {
            info!("{}/{}: sampling recovered", key.0, key.1);
            self.failing.remove(&key);
        }
        self.failing.extend(failed);
        samples
    }

    /// Derive rates and group samples into one snapshot per endpoint.
    ///
    /// Stale counter samples report a zero rate and leave the baseline alone,
    /// so the next good sample is differenced against the last good one.
    fn build_snapshots(&mut self, at: f64, samples: &[Sample]) -> Vec<Snapshot> {
        let mut builders: Vec<SnapshotBuilder> = self
            .endpoints
            .iter()
            .map(|e| SnapshotBuilder::new(e.clone(), at))
            .collect();

        for sample in samples {
            let Some(idx) = self.endpoints.iter().position(|e| *e == sample.endpoint) else {
                continue;
            };
            let builder = &mut builders[idx];

            if sample.stale {
                builder.stale(sample.metric);
                continue;
            }

            if sample.metric.is_counter() {
                let key = (sample.endpoint.clone(), sample.metric);
                let r = match self.counters.get_mut(&key) {
                    Some(state) => state.advance(sample.value, sample.collected_at),
                    None => {
                        self.counters
                            .insert(key, CounterState::new(sample.value, sample.collected_at));
                        rate(sample.value, None, 0.0)
                    }
                };
                builder.counter(sample.metric, sample.value, r);
            } else {
                builder.value(sample.metric, sample.value);
            }
        }

        builders.into_iter().map(SnapshotBuilder::build).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::MetricValue;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Returns scripted values per (endpoint, metric); missing → Unreachable.
    #[derive(Default)]
    struct Scripted {
        values: Mutex<HashMap<(String, MetricId), Result<MetricValue, SourceError>>>,
    }

    impl Scripted {
        fn set(&self, endpoint: &str, metric: MetricId, v: Result<MetricValue, SourceError>) {
            self.values.lock().insert((endpoint.to_string(), metric), v);
        }
    }

    #[async_trait]
    impl MetricSource for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn sample(
            &self,
            endpoint: &EndpointId,
            metric: MetricId,
        ) -> Result<MetricValue, SourceError> {
            self.values
                .lock()
                .get(&(endpoint.to_string(), metric))
                .cloned()
                .unwrap_or_else(|| Err(SourceError::Unreachable("unscripted".into())))
        }
    }

    fn setup(
        endpoints: &[&str],
        metrics: &[MetricId],
    ) -> (Collector, Arc<Scripted>, Arc<TelemetryStore>) {
        let source = Arc::new(Scripted::default());
        let store = Arc::new(TelemetryStore::new(300).unwrap());
        let collector = Collector::new(
            endpoints.iter().map(|e| EndpointId::new(e)).collect(),
            metrics.to_vec(),
            source.clone(),
            store.clone(),
        )
        .unwrap();
        (collector, source, store)
    }

    #[test]
    fn empty_sets_are_rejected() {
        let store = Arc::new(TelemetryStore::new(1).unwrap());
        let source: Arc<dyn MetricSource> = Arc::new(Scripted::default());
        assert!(matches!(
            Collector::new(vec![], vec![MetricId::BytesIn], source.clone(), store.clone()),
            Err(ConfigError::NoEndpoints)
        ));
        assert!(matches!(
            Collector::new(vec![EndpointId::new("server")], vec![], source, store),
            Err(ConfigError::NoMetrics)
        ));
    }

    #[test]
    fn duplicates_are_dropped() {
        let (c, _, _) = setup(
            &["server", "server", "client"],
            &[MetricId::BytesIn, MetricId::BytesIn],
        );
        assert_eq!(c.endpoints().len(), 2);
        assert_eq!(c.metrics(), &[MetricId::BytesIn]);
    }

    #[test]
    fn zero_durations_are_rejected() {
        let (c, _, _) = setup(&["server"], &[MetricId::CpuPercent]);
        assert!(matches!(
            c.with_interval(Duration::ZERO),
            Err(ConfigError::ZeroInterval)
        ));
        let (c, _, _) = setup(&["server"], &[MetricId::CpuPercent]);
        assert!(matches!(
            c.with_sample_timeout(Duration::ZERO),
            Err(ConfigError::ZeroTimeout)
        ));
    }

    #[tokio::test]
    async fn first_counter_sample_has_zero_rate() {
        let (mut c, src, store) = setup(&["server"], &[MetricId::BytesIn]);
        src.set("server", MetricId::BytesIn, Ok(MetricValue::Counter(1000)));
        assert_eq!(c.collect_cycle(100.0).await, 1);

        let snap = store.current(&EndpointId::new("server")).unwrap();
        assert_eq!(snap.value(MetricId::BytesIn), Some(1000.0));
        assert_eq!(snap.rate(MetricId::BytesIn), Some(0.0));
        assert_eq!(
            c.counter_state(&EndpointId::new("server"), MetricId::BytesIn),
            Some(CounterState::new(1000.0, 100.0))
        );
    }

    #[tokio::test]
    async fn counter_rate_and_reset_sequence() {
        let (mut c, src, store) = setup(&["server"], &[MetricId::BytesIn]);
        let server = EndpointId::new("server");

        for (t, v, expected) in [
            (100.0, 1000, 0.0),
            (101.0, 1500, 500.0),
            (102.0, 200, 0.0),
            (103.0, 700, 500.0),
        ] {
            src.set("server", MetricId::BytesIn, Ok(MetricValue::Counter(v)));
            c.collect_cycle(t).await;
            let snap = store.current(&server).unwrap();
            assert_eq!(snap.rate(MetricId::BytesIn), Some(expected), "at t={t}");
        }
        assert!(
            store
                .history()
                .iter()
                .all(|s| s.rate(MetricId::BytesIn).unwrap() >= 0.0)
        );
    }

    #[tokio::test]
    async fn stale_counter_keeps_baseline() {
        let (mut c, src, store) = setup(&["server"], &[MetricId::BytesOut]);
        let server = EndpointId::new("server");

        src.set("server", MetricId::BytesOut, Ok(MetricValue::Counter(1000)));
        c.collect_cycle(10.0).await;
        src.set("server", MetricId::BytesOut, Err(SourceError::Timeout));
        c.collect_cycle(11.0).await;

        let snap = store.current(&server).unwrap();
        assert!(snap.is_stale(MetricId::BytesOut));
        assert_eq!(snap.value(MetricId::BytesOut), Some(0.0));
        assert_eq!(snap.rate(MetricId::BytesOut), Some(0.0));
        assert_eq!(
            c.counter_state(&server, MetricId::BytesOut),
            Some(CounterState::new(1000.0, 10.0))
        );

        src.set("server", MetricId::BytesOut, Ok(MetricValue::Counter(3000)));
        c.collect_cycle(12.0).await;
        let snap = store.current(&server).unwrap();
        assert_eq!(snap.rate(MetricId::BytesOut), Some(1000.0));
    }

    #[tokio::test]
    async fn one_failure_does_not_block_the_cycle() {
        let metrics = [MetricId::BytesIn, MetricId::CpuPercent];
        let (mut c, src, store) = setup(&["server", "client"], &metrics);
        src.set("server", MetricId::BytesIn, Ok(MetricValue::Counter(10)));
        src.set("server", MetricId::CpuPercent, Err(SourceError::Timeout));
        src.set("client", MetricId::BytesIn, Ok(MetricValue::Counter(20)));
        src.set("client", MetricId::CpuPercent, Ok(MetricValue::Gauge(35)));

        assert_eq!(c.collect_cycle(1.0).await, 2);
        let server = store.current(&EndpointId::new("server")).unwrap();
        let client = store.current(&EndpointId::new("client")).unwrap();
        assert!(server.is_stale(MetricId::CpuPercent));
        assert_eq!(server.value(MetricId::BytesIn), Some(10.0));
        assert!(!client.has_stale());
        assert_eq!(client.value(MetricId::CpuPercent), Some(35.0));
        assert_eq!(store.cycles(), 1);
    }

    #[tokio::test]
    async fn gauges_have_no_counter_state() {
        let (mut c, src, _) = setup(&["client"], &[MetricId::LatencyMs]);
        src.set("client", MetricId::LatencyMs, Ok(MetricValue::Float(12.5)));
        c.collect_cycle(1.0).await;
        assert!(
            c.counter_state(&EndpointId::new("client"), MetricId::LatencyMs)
                .is_none()
        );
    }

    /// Never answers; exercises the per-sample deadline.
    struct Hanging;

    #[async_trait]
    impl MetricSource for Hanging {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn sample(
            &self,
            _endpoint: &EndpointId,
            _metric: MetricId,
        ) -> Result<MetricValue, SourceError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_source_times_out_into_stale_values() {
        let store = Arc::new(TelemetryStore::new(10).unwrap());
        let mut c = Collector::new(
            vec![EndpointId::new("server")],
            vec![MetricId::BytesIn, MetricId::CpuPercent],
            Arc::new(Hanging),
            store.clone(),
        )
        .unwrap()
        .with_sample_timeout(Duration::from_millis(200))
        .unwrap();

        c.collect_cycle(1.0).await;
        let snap = store.current(&EndpointId::new("server")).unwrap();
        assert!(snap.is_stale(MetricId::BytesIn));
        assert!(snap.is_stale(MetricId::CpuPercent));
    }

    /// Hangs for one pair, answers every other pair immediately.
    struct HangsOn {
        endpoint: &'static str,
        metric: MetricId,
    }

    #[async_trait]
    impl MetricSource for HangsOn {
        fn name(&self) -> &str {
            "hangs-on"
        }

        async fn sample(
            &self,
            endpoint: &EndpointId,
            metric: MetricId,
        ) -> Result<MetricValue, SourceError> {
            if endpoint.as_str() == self.endpoint && metric == self.metric {
                std::future::pending::<()>().await;
            }
            Ok(MetricValue::Gauge(7))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_hanging_pair_costs_one_timeout() {
        let store = Arc::new(TelemetryStore::new(10).unwrap());
        let source = HangsOn {
            endpoint: "server",
            metric: MetricId::CpuPercent,
        };
        let mut c = Collector::new(
            vec![EndpointId::new("server"), EndpointId::new("client")],
            vec![MetricId::CpuPercent, MetricId::MemoryPercent],
            Arc::new(source),
            store.clone(),
        )
        .unwrap()
        .with_sample_timeout(Duration::from_millis(200))
        .unwrap();

        let started = tokio::time::Instant::now();
        assert_eq!(c.collect_cycle(1.0).await, 2);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");

        let server = store.current(&EndpointId::new("server")).unwrap();
        let client = store.current(&EndpointId::new("client")).unwrap();
        assert!(server.is_stale(MetricId::CpuPercent));
        assert_eq!(server.value(MetricId::MemoryPercent), Some(7.0));
        assert!(!client.has_stale());
        assert_eq!(client.value(MetricId::CpuPercent), Some(7.0));
        assert_eq!(store.cycles(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_cancel_without_partial_publish() {
        let store = Arc::new(TelemetryStore::new(10).unwrap());
        let mut c = Collector::new(
            vec![EndpointId::new("server")],
            vec![MetricId::CpuPercent],
            Arc::new(Hanging),
            store.clone(),
        )
        .unwrap()
        .with_sample_timeout(Duration::from_secs(3600))
        .unwrap();

        let cancel = CancellationToken::new();
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { c.run(cancel).await })
        };
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(store.cycles(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_publishes_on_each_tick() {
        let (c, src, store) = setup(&["server"], &[MetricId::CpuPercent]);
        src.set("server", MetricId::CpuPercent, Ok(MetricValue::Gauge(5)));
        let mut c = c.with_interval(Duration::from_secs(1)).unwrap();

        let cancel = CancellationToken::new();
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { c.run(cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(3500)).await;
        cancel.cancel();
        handle.await.unwrap();
        // Ticks at 0s, 1s, 2s, 3s.
        assert_eq!(store.cycles(), 4);
    }
}
