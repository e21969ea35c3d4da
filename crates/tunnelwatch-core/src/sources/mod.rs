//! Concrete [`MetricSource`] backends and their construction from config.
//!
//! All protocol text (snmpget lines, procfs tables, CLI output) is parsed
//! here; everything above this module sees typed values only.

pub mod helpers;

pub mod command;
pub mod local;
pub mod simulated;
pub mod snmp;

pub use command::CommandSource;
pub use local::LocalSource;
pub use simulated::SimulatedSource;
pub use snmp::SnmpSource;

use crate::config::{MonitorConfig, SourceSpec};
use crate::error::ConfigError;
use crate::source::{EndpointRouter, MetricSource};

/// Instantiate the backend described by `spec`.
pub fn build_source(spec: &SourceSpec) -> Box<dyn MetricSource> {
    match spec {
        SourceSpec::Snmp {
            host,
            port,
            community,
            version,
            extend,
        } => Box::new(
            SnmpSource::new(host, *port, community)
                .with_version(version)
                .with_extend(*extend),
        ),
        SourceSpec::Command { program, args } => {
            Box::new(CommandSource::new(program, args.clone()))
        }
        SourceSpec::Local {
            port,
            probe,
            interfaces,
        } => Box::new(
            LocalSource::new()
                .with_port(*port)
                .with_probe(probe.clone())
                .with_interfaces(interfaces.clone()),
        ),
        SourceSpec::Simulated { seed } => match seed {
            Some(seed) => Box::new(SimulatedSource::seeded(*seed)),
            None => Box::new(SimulatedSource::new()),
        },
    }
}

/// One route per configured endpoint.
pub fn build_router(config: &MonitorConfig) -> Result<EndpointRouter, ConfigError> {
    config.validate()?;
    let mut router = EndpointRouter::new();
    for endpoint in &config.endpoints {
        let source = build_source(&endpoint.source);
        log::debug!("endpoint '{}' uses {} source", endpoint.name, source.name());
        router.route(endpoint.id(), source);
    }
    Ok(router)
}
