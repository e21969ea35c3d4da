//! Logger setup.
//!
//! Headless commands log to stderr. Dashboard commands log to a file so log
//! lines never land on the alternate screen. Both honour `RUST_LOG` and
//! default to `info`.

use std::fs::OpenOptions;

use env_logger::{Builder, Env, Target};

fn builder() -> Builder {
    Builder::from_env(Env::default().default_filter_or("info"))
}

/// Log to stderr.
pub fn init_logging() {
    let _ = builder().target(Target::Stderr).try_init();
}

/// Append to `path`; falls back to discarding logs if it cannot be opened.
pub fn init_file_logging(path: &str) {
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            let _ = builder()
                .target(Target::Pipe(Box::new(file)))
                .write_style(env_logger::WriteStyle::Never)
                .try_init();
        }
        Err(e) => {
            eprintln!("warning: cannot open log file {path}: {e}; logging disabled");
            log::set_max_level(log::LevelFilter::Off);
        }
    }
}
