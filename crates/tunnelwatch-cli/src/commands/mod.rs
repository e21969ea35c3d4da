pub mod config;
pub mod monitor;
pub mod probe;
pub mod run;
pub mod serve;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use thiserror::Error;

use tunnelwatch_core::{Collector, ConfigError, MonitorConfig, TelemetryStore, build_router};
use tunnelwatch_server::AppState;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "tunnelwatch.toml";

/// Flags shared by every command that runs the engine.
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// TOML config file (default: ./tunnelwatch.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Polling interval in milliseconds
    #[arg(long)]
    pub interval: Option<u64>,

    /// History capacity in snapshots
    #[arg(long)]
    pub history: Option<usize>,

    /// Per-sample timeout in milliseconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Ignore any config file and monitor two simulated endpoints
    #[arg(long)]
    pub demo: bool,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("no configuration found: pass --config <file>, create ./tunnelwatch.toml, or use --demo")]
    NoConfig,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Print the error and exit with status 1.
pub fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("error: {e}");
    std::process::exit(1);
}

/// Parse a config file.
pub fn read_config(path: &Path) -> Result<MonitorConfig, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve the config for `args`: demo, file, then command-line overrides.
pub fn load_config(args: &EngineArgs) -> Result<MonitorConfig, CliError> {
    let mut config = if args.demo {
        MonitorConfig::demo()
    } else if let Some(path) = &args.config {
        read_config(path)?
    } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
        read_config(Path::new(DEFAULT_CONFIG_FILE))?
    } else {
        return Err(CliError::NoConfig);
    };

    if let Some(ms) = args.interval {
        config.interval_ms = ms;
    }
    if let Some(n) = args.history {
        config.history_capacity = n;
    }
    if let Some(ms) = args.timeout {
        config.sample_timeout_ms = ms;
    }
    config.validate()?;
    Ok(config)
}

/// Collector and store wired up from one config.
pub struct Engine {
    pub config: MonitorConfig,
    pub store: Arc<TelemetryStore>,
    pub collector: Collector,
}

impl Engine {
    pub fn new(config: MonitorConfig) -> Result<Self, CliError> {
        let store = Arc::new(TelemetryStore::new(config.history_capacity)?);
        let source = Arc::new(build_router(&config)?);
        let collector = Collector::from_config(&config, source, Arc::clone(&store))?;
        Ok(Self {
            config,
            store,
            collector,
        })
    }

    /// Server state sharing this engine's store.
    pub fn app_state(&self) -> AppState {
        AppState::new(
            Arc::clone(&self.store),
            self.config.effective_thresholds(),
            self.config.endpoint_ids(),
        )
    }
}

/// Load the config for `args` and build the engine, exiting on failure.
pub fn make_engine(args: &EngineArgs) -> Engine {
    load_config(args)
        .and_then(Engine::new)
        .unwrap_or_else(|e| fail(e))
}

/// Build the tokio runtime, exiting on failure.
pub fn make_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().unwrap_or_else(|e| fail(format!("tokio runtime: {e}")))
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

pub fn format_bytes(value: f64) -> String {
    let mut v = value.abs();
    let units = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut idx = 0usize;
    while v >= 1024.0 && idx < units.len() - 1 {
        v /= 1024.0;
        idx += 1;
    }
    format!("{v:.2}{}", units[idx])
}

/// Bytes per second as megabits per second (2^20 bits).
pub fn to_mbps(bytes_per_sec: f64) -> f64 {
    bytes_per_sec * 8.0 / (1024.0 * 1024.0)
}
