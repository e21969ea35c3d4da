//! Error types.
//!
//! [`SourceError`] is recovered inside a collection cycle and never escapes
//! it. [`ConfigError`] is only raised while constructing the engine.

use thiserror::Error;

use crate::metric::{EndpointId, MetricId};

/// Why a [`MetricSource`](crate::source::MetricSource) could not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("timed out waiting for the agent")]
    Timeout,
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("metric {0} not supported by this source")]
    Unsupported(MetricId),
}

/// Misconfiguration detected before any polling starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("no endpoints configured")]
    NoEndpoints,
    #[error("no metrics configured")]
    NoMetrics,
    #[error("duplicate endpoint '{0}'")]
    DuplicateEndpoint(EndpointId),
    #[error("history capacity must be at least 1")]
    ZeroCapacity,
    #[error("polling interval must be greater than zero")]
    ZeroInterval,
    #[error("sample timeout must be greater than zero")]
    ZeroTimeout,
    #[error("invalid thresholds for {metric}: warn={warn} critical={critical}")]
    InvalidThresholds {
        metric: MetricId,
        warn: f64,
        critical: f64,
    },
    #[error("endpoint '{endpoint}': {reason}")]
    InvalidSource { endpoint: EndpointId, reason: String },
}

/// Top-level error for operations outside the polling loop.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
