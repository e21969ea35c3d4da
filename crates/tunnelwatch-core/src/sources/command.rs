//! CommandSource: runs the companion metrics CLI once per sample.
//!
//! The CLI takes a single subcommand and prints one line:
//!
//! | subcommand    | output         | metrics                    |
//! |---------------|----------------|----------------------------|
//! | `throughput`  | `rx:tx`        | bytes in, bytes out        |
//! | `connections` | `12 active`    | active connections         |
//! | `latency`     | `3.21` / `3ms` | latency                    |

use async_trait::async_trait;

use crate::error::SourceError;
use crate::metric::{EndpointId, MetricId, MetricValue};
use crate::source::MetricSource;

use super::helpers::{parse_f64_with_unit, parse_u64, run_command};

/// Default companion binary name.
pub const DEFAULT_PROGRAM: &str = "sssonector-snmp";

/// Subcommand that reports `metric`, if any.
pub fn subcommand_for(metric: MetricId) -> Option<&'static str> {
    match metric {
        MetricId::BytesIn | MetricId::BytesOut => Some("throughput"),
        MetricId::ActiveConnections => Some("connections"),
        MetricId::LatencyMs => Some("latency"),
        MetricId::CpuPercent | MetricId::MemoryPercent => None,
    }
}

/// Parse the CLI's output for `metric`.
pub fn parse_command_output(metric: MetricId, output: &str) -> Result<MetricValue, SourceError> {
    let line = output.trim();
    if line.is_empty() {
        return Err(SourceError::Malformed("empty output".into()));
    }
    match metric {
        MetricId::BytesIn | MetricId::BytesOut => {
            let (rx, tx) = line
                .split_once(':')
                .ok_or_else(|| SourceError::Malformed(format!("expected rx:tx, got '{line}'")))?;
            let raw = if metric == MetricId::BytesIn { rx } else { tx };
            parse_u64(raw).map(MetricValue::Counter)
        }
        MetricId::ActiveConnections => {
            // The count may be followed by a word, e.g. `12 connections`.
            let count = line.trim_matches('"').split_whitespace().next().unwrap_or("");
            parse_u64(count).map(MetricValue::Gauge)
        }
        MetricId::LatencyMs => parse_f64_with_unit(line, "ms").map(MetricValue::Float),
        MetricId::CpuPercent | MetricId::MemoryPercent => Err(SourceError::Unsupported(metric)),
    }
}

/// Shells out to the companion CLI.
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
}

impl CommandSource {
    /// `args` are placed before the subcommand, e.g. a `--host` flag.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CommandSource {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM, Vec::new())
    }
}

#[async_trait]
impl MetricSource for CommandSource {
    fn name(&self) -> &str {
        "command"
    }

    async fn sample(
        &self,
        endpoint: &EndpointId,
        metric: MetricId,
    ) -> Result<MetricValue, SourceError> {
        let sub = subcommand_for(metric).ok_or(SourceError::Unsupported(metric))?;
        let mut args = self.args.clone();
        args.push(sub.to_string());
        let stdout = run_command(&self.program, &args).await?;
        let value = parse_command_output(metric, &stdout)?;
        log::trace!("{endpoint} {metric} via {} {sub} = {value:?}", self.program);
        Ok(value)
    }
}
