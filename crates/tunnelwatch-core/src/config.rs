//! Engine configuration.
//!
//! The engine only accepts an already-parsed [`MonitorConfig`]; reading it
//! from disk or the command line is the binary's job. [`MonitorConfig::validate`]
//! catches every misconfiguration that would otherwise surface mid-run.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::ThresholdTable;
use crate::error::ConfigError;
use crate::metric::{EndpointId, MetricId};
use crate::store::DEFAULT_HISTORY_CAPACITY;

/// How to reach one endpoint's telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    /// Query the tunnel's SNMP agent with `snmpget`.
    Snmp {
        host: String,
        #[serde(default = "default_snmp_port")]
        port: u16,
        #[serde(default = "default_community")]
        community: String,
        /// SNMP protocol version flag passed to `snmpget` (`1` or `2c`).
        #[serde(default = "default_snmp_version")]
        version: String,
        /// Read the companion scripts' `NET-SNMP-EXTEND-MIB` output objects
        /// instead of the enterprise MIB. This is the only way to get a
        /// remote endpoint's latency.
        #[serde(default)]
        extend: bool,
    },
    /// Run a companion CLI that prints one metric per invocation.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Sample this host directly from procfs.
    Local {
        /// Only count established TCP connections on this local port.
        #[serde(default)]
        port: Option<u16>,
        /// `host:port` to time a TCP connect against for latency.
        #[serde(default)]
        probe: Option<String>,
        /// Interfaces to sum for byte counters; empty means all but loopback.
        #[serde(default)]
        interfaces: Vec<String>,
    },
    /// Synthetic traffic for demos.
    Simulated {
        #[serde(default)]
        seed: Option<u64>,
    },
}

fn default_snmp_port() -> u16 {
    161
}

fn default_community() -> String {
    "public".to_string()
}

fn default_snmp_version() -> String {
    "1".to_string()
}

/// One monitored peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub source: SourceSpec,
}

impl EndpointConfig {
    pub fn id(&self) -> EndpointId {
        EndpointId::new(&self.name)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidSource {
            endpoint: self.id(),
            reason: reason.to_string(),
        };
        match &self.source {
            SourceSpec::Snmp {
                host,
                community,
                version,
                ..
            } => {
                if host.trim().is_empty() {
                    return Err(invalid("snmp host is empty"));
                }
                if community.trim().is_empty() {
                    return Err(invalid("snmp community is empty"));
                }
                if !matches!(version.as_str(), "1" | "2c") {
                    return Err(invalid("snmp version must be \"1\" or \"2c\""));
                }
            }
            SourceSpec::Command { program, .. } => {
                if program.trim().is_empty() {
                    return Err(invalid("command program is empty"));
                }
            }
            SourceSpec::Local { probe, .. } => {
                if let Some(probe) = probe
                    && !probe.contains(':')
                {
                    return Err(invalid("local probe must be host:port"));
                }
            }
            SourceSpec::Simulated { .. } => {}
        }
        Ok(())
    }
}

/// Everything the engine needs to start polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_ms: u64,
    pub history_capacity: usize,
    pub sample_timeout_ms: u64,
    pub metrics: Vec<MetricId>,
    /// Overrides on top of [`ThresholdTable::default`].
    pub thresholds: ThresholdTable,
    pub endpoints: Vec<EndpointConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            sample_timeout_ms: 1000,
            metrics: MetricId::ALL.to_vec(),
            thresholds: ThresholdTable::empty(),
            endpoints: Vec::new(),
        }
    }
}

impl MonitorConfig {
    /// Two simulated endpoints, `server` and `client`.
    pub fn demo() -> Self {
        Self {
            endpoints: vec![
                EndpointConfig {
                    name: "server".into(),
                    source: SourceSpec::Simulated { seed: Some(1) },
                },
                EndpointConfig {
                    name: "client".into(),
                    source: SourceSpec::Simulated { seed: Some(2) },
                },
            ],
            ..Self::default()
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms)
    }

    pub fn endpoint_ids(&self) -> Vec<EndpointId> {
        self.endpoints.iter().map(EndpointConfig::id).collect()
    }

    /// Built-in thresholds with this config's overrides applied.
    pub fn effective_thresholds(&self) -> ThresholdTable {
        ThresholdTable::default().merged(&self.thresholds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        if self.metrics.is_empty() {
            return Err(ConfigError::NoMetrics);
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.sample_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if !seen.insert(endpoint.name.as_str()) {
                return Err(ConfigError::DuplicateEndpoint(endpoint.id()));
            }
            endpoint.validate()?;
        }
        self.thresholds.validate()
    }
}
