//! SimulatedSource: synthetic tunnel traffic for demos and UI work.
//!
//! Byte counters grow by a random amount on every read and occasionally
//! reset to zero, as a restarted agent would. Gauges follow a bounded
//! random walk so the dashboard moves through all three severity bands.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::SourceError;
use crate::metric::{EndpointId, MetricId, MetricValue};
use crate::source::MetricSource;

/// Chance per counter read that the agent "restarts".
const RESET_PROBABILITY: f64 = 0.002;

/// Largest per-read counter increment (about 40 Mbps at 1 Hz).
const MAX_BYTES_PER_READ: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
struct Walk {
    bytes_in: u64,
    bytes_out: u64,
    connections: f64,
    cpu: f64,
    memory: f64,
    latency: f64,
}

impl Default for Walk {
    fn default() -> Self {
        Self {
            bytes_in: 0,
            bytes_out: 0,
            connections: 8.0,
            cpu: 25.0,
            memory: 40.0,
            latency: 20.0,
        }
    }
}

fn step(rng: &mut StdRng, value: f64, spread: f64, min: f64, max: f64) -> f64 {
    (value + rng.random_range(-spread..=spread)).clamp(min, max)
}

/// Demo source; one independent walk per endpoint.
pub struct SimulatedSource {
    rng: Mutex<StdRng>,
    walks: Mutex<HashMap<EndpointId, Walk>>,
}

impl SimulatedSource {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Reproducible sequence for tests and screenshots.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            walks: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn sample(
        &self,
        endpoint: &EndpointId,
        metric: MetricId,
    ) -> Result<MetricValue, SourceError> {
        let mut rng = self.rng.lock();
        let mut walks = self.walks.lock();
        let walk = walks.entry(endpoint.clone()).or_default();

        let value = match metric {
            MetricId::BytesIn | MetricId::BytesOut => {
                let counter = if metric == MetricId::BytesIn {
                    &mut walk.bytes_in
                } else {
                    &mut walk.bytes_out
                };
                if rng.random_bool(RESET_PROBABILITY) {
                    *counter = 0;
                } else {
                    *counter = counter.wrapping_add(rng.random_range(0..=MAX_BYTES_PER_READ));
                }
                MetricValue::Counter(*counter)
            }
            MetricId::ActiveConnections => {
                walk.connections = step(&mut rng, walk.connections, 3.0, 0.0, 1200.0);
                MetricValue::Gauge(walk.connections.round() as u64)
            }
            MetricId::CpuPercent => {
                walk.cpu = step(&mut rng, walk.cpu, 6.0, 0.0, 100.0);
                MetricValue::Float(walk.cpu)
            }
            MetricId::MemoryPercent => {
                walk.memory = step(&mut rng, walk.memory, 2.0, 0.0, 100.0);
                MetricValue::Float(walk.memory)
            }
            MetricId::LatencyMs => {
                walk.latency = step(&mut rng, walk.latency, 8.0, 1.0, 400.0);
                MetricValue::Float(walk.latency)
            }
        };
        Ok(value)
    }
}
