use tunnelwatch_core::MonitorConfig;

use super::{EngineArgs, fail, load_config};

/// Render `config` with the built-in thresholds filled in.
pub fn render(config: &MonitorConfig) -> Result<String, toml::ser::Error> {
    let mut effective = config.clone();
    effective.thresholds = config.effective_thresholds();
    toml::to_string_pretty(&effective)
}

pub fn run(args: &EngineArgs) {
    let config = load_config(args).unwrap_or_else(|e| fail(e));
    match render(&config) {
        Ok(text) => print!("{text}"),
        Err(e) => fail(e),
    }
}
