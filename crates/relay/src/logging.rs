//! Process-wide logging setup.
//!
//! Grounded on `crates/infra-common/src/logging/setup.rs::LoggingConfig`/
//! `setup_logging` from the teacher: a small config struct plus a single
//! `tracing_subscriber::fmt` initializer, narrowed to the fields this relay
//! actually uses (no JSON-formatting toggle — nothing in the corpus wires
//! one up to an actual log shipper, so it's dropped rather than carried as
//! dead configuration).

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Passed straight to `EnvFilter`; e.g. `"relay=debug,info"`. Falls back
    /// to `RUST_LOG` if unset, then to `"info"`.
    pub filter: Option<String>,
    pub with_file_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: None,
            with_file_info: false,
        }
    }
}

pub fn setup_logging(config: LoggingConfig) {
    let filter = match config.filter {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(config.with_file_info)
        .with_line_number(config.with_file_info);

    if let Err(e) = subscriber.try_init() {
        eprintln!("logging already initialized: {e}");
    }
}

pub fn log_welcome(app_name: &str, version: &str) {
    tracing::info!("starting {app_name} v{version}");
}
