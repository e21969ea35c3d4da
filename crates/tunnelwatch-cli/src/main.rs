//! CLI for tunnelwatch: live telemetry for both ends of a tunnel.

mod commands;
mod logging;
mod tui;

use clap::{Parser, Subcommand};

use commands::EngineArgs;

#[derive(Parser)]
#[command(name = "tunnelwatch")]
#[command(about = "tunnelwatch: live throughput, connection and resource telemetry for a tunnel")]
#[command(version = tunnelwatch_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Live terminal dashboard (TUI)
    Monitor {
        #[command(flatten)]
        engine: EngineArgs,

        /// Log file; the dashboard owns the terminal
        #[arg(long, default_value = "tunnelwatch.log")]
        log_file: String,
    },

    /// Serve telemetry as JSON over HTTP (headless)
    Serve {
        #[command(flatten)]
        engine: EngineArgs,

        /// Port to listen on
        #[arg(long, default_value = "8043")]
        port: u16,

        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Dashboard and HTTP exporter over the same collector
    Run {
        #[command(flatten)]
        engine: EngineArgs,

        /// Port to listen on
        #[arg(long, default_value = "8043")]
        port: u16,

        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Log file; the dashboard owns the terminal
        #[arg(long, default_value = "tunnelwatch.log")]
        log_file: String,
    },

    /// Run a single collection cycle and print it as JSON
    Probe {
        #[command(flatten)]
        engine: EngineArgs,

        /// Run two cycles one interval apart so counter rates are populated
        #[arg(long)]
        rates: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        engine: EngineArgs,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Monitor { engine, log_file } => {
            logging::init_file_logging(&log_file);
            commands::monitor::run(&engine)
        }
        Commands::Serve { engine, port, host } => {
            logging::init_logging();
            commands::serve::run(&engine, &host, port)
        }
        Commands::Run {
            engine,
            port,
            host,
            log_file,
        } => {
            logging::init_file_logging(&log_file);
            commands::run::run(&engine, &host, port)
        }
        Commands::Probe { engine, rates } => {
            logging::init_logging();
            commands::probe::run(&engine, rates)
        }
        Commands::Config { engine } => commands::config::run(&engine),
    }
}
