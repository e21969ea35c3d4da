//! SnmpSource: queries the tunnel's SNMP agent through `snmpget`.
//!
//! The agent exposes its counters under the enterprise subtree
//! `.1.3.6.1.4.1.54321`. `snmpget` prints one typed line per OID:
//!
//! ```text
//! SNMPv2-SMI::enterprises.54321.1.1 = Counter64: 1048576
//! SNMPv2-SMI::enterprises.54321.1.7 = Gauge32: 3
//! ```
//!
//! The type tag decides the [`MetricValue`] variant.
//!
//! In extend mode the agent instead runs the companion scripts through
//! `NET-SNMP-EXTEND-MIB` and returns their output as a string:
//!
//! ```text
//! NET-SNMP-EXTEND-MIB::nsExtendOutputFull."sssonector-latency" = STRING: 3.2 ms
//! ```
//!
//! Those payloads are parsed exactly like [`CommandSource`](super::CommandSource) output.

use async_trait::async_trait;

use crate::error::SourceError;
use crate::metric::{EndpointId, MetricId, MetricValue};
use crate::source::MetricSource;

use super::command::{parse_command_output, subcommand_for};
use super::helpers::{parse_f64_with_unit, parse_u64, run_command};

/// Root of the tunnel agent's MIB.
pub const ENTERPRISE_OID: &str = ".1.3.6.1.4.1.54321";

/// OID for `metric`, or `None` when the agent does not export it.
pub fn oid_for(metric: MetricId) -> Option<String> {
    let leaf = match metric {
        MetricId::BytesIn => ".1.1",
        MetricId::BytesOut => ".1.2",
        MetricId::ActiveConnections => ".1.7",
        MetricId::CpuPercent => ".1.8",
        MetricId::MemoryPercent => ".1.9",
        MetricId::LatencyMs => return None,
    };
    Some(format!("{ENTERPRISE_OID}{leaf}"))
}

/// Extend-MIB output object of the companion script reporting `metric`.
pub fn extend_oid_for(metric: MetricId) -> Option<String> {
    subcommand_for(metric)
        .map(|sub| format!("NET-SNMP-EXTEND-MIB::nsExtendOutputFull.\"sssonector-{sub}\""))
}

/// Right-hand side of the first non-empty `OID = value` line.
fn value_part(output: &str) -> Result<&str, SourceError> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| SourceError::Malformed("empty snmpget output".into()))?;
    let typed = match line.split_once(" = ") {
        Some((_, rhs)) => rhs.trim(),
        None => line,
    };
    if typed.starts_with("No Such") || typed.starts_with("No more variables") {
        return Err(SourceError::Malformed(typed.to_string()));
    }
    Ok(typed)
}

/// Parse an extend-MIB `STRING:` payload for `metric`.
pub fn parse_extend_output(metric: MetricId, output: &str) -> Result<MetricValue, SourceError> {
    let typed = value_part(output)?;
    let payload = typed
        .strip_prefix("STRING:")
        .ok_or_else(|| SourceError::Malformed(format!("expected STRING, got '{typed}'")))?;
    parse_command_output(metric, payload.trim().trim_matches('"'))
}

/// Parse one line of `snmpget` output into a typed value.
pub fn parse_snmpget_output(output: &str) -> Result<MetricValue, SourceError> {
    let typed = value_part(output)?;
    let (tag, raw) = typed
        .split_once(':')
        .ok_or_else(|| SourceError::Malformed(format!("untyped value '{typed}'")))?;

    match tag.trim() {
        "Counter64" | "Counter32" => parse_u64(raw).map(MetricValue::Counter),
        "Gauge32" | "Unsigned32" => parse_u64(raw).map(MetricValue::Gauge),
        "INTEGER" => {
            // Enumerated integers print as `up(1)`.
            let raw = raw.trim();
            let number = match (raw.find('('), raw.strip_suffix(')')) {
                (Some(open), Some(inner)) => &inner[open + 1..],
                _ => raw,
            };
            parse_u64(number).map(MetricValue::Gauge)
        }
        "STRING" | "Opaque" => parse_f64_with_unit(raw, "%").map(MetricValue::Float),
        other => Err(SourceError::Malformed(format!("unsupported SNMP type '{other}'"))),
    }
}

/// Polls one SNMP agent.
///
/// The collector routes one endpoint to one `SnmpSource`, so the endpoint id
/// passed to [`MetricSource::sample`] is only used for logging.
#[derive(Debug, Clone)]
pub struct SnmpSource {
    host: String,
    port: u16,
    community: String,
    version: String,
    extend: bool,
    program: String,
}

impl SnmpSource {
    pub fn new(host: impl Into<String>, port: u16, community: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            community: community.into(),
            version: "1".to_string(),
            extend: false,
            program: "snmpget".to_string(),
        }
    }

    /// SNMP version flag (`1` or `2c`).
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Query the extend-MIB script outputs instead of the enterprise MIB.
    pub fn with_extend(mut self, extend: bool) -> Self {
        self.extend = extend;
        self
    }

    /// Use a different `snmpget` binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Arguments for one `snmpget` call: one try, one second.
    pub fn args(&self, oid: &str) -> Vec<String> {
        vec![
            "-v".into(),
            self.version.clone(),
            "-c".into(),
            self.community.clone(),
            "-t".into(),
            "1".into(),
            "-r".into(),
            "1".into(),
            self.target(),
            oid.to_string(),
        ]
    }
}

#[async_trait]
impl MetricSource for SnmpSource {
    fn name(&self) -> &str {
        "snmp"
    }

    async fn sample(
        &self,
        endpoint: &EndpointId,
        metric: MetricId,
    ) -> Result<MetricValue, SourceError> {
        let oid = if self.extend {
            extend_oid_for(metric)
        } else {
            oid_for(metric)
        }
        .ok_or(SourceError::Unsupported(metric))?;
        let stdout = run_command(&self.program, &self.args(&oid)).await?;
        let value = if self.extend {
            parse_extend_output(metric, &stdout)?
        } else {
            parse_snmpget_output(&stdout)?
        };
        log::trace!("{endpoint} {metric} via {} = {value:?}", self.target());
        Ok(value)
    }
}
