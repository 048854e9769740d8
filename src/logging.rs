use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_ENV: &str = "ROLO_LOG";

/// Initialize tracing when `ROLO_LOG` names a log file.
///
/// Nothing is written to the terminal: the interactive screen owns it.
/// The filter defaults to `info` and follows `RUST_LOG` when set.
pub fn init_tracing() {
    let Some(log_path) = std::env::var_os(LOG_ENV).filter(|path| !path.is_empty()) else {
        return;
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!(
                "warning: failed to open log file {}: {}",
                log_path.to_string_lossy(),
                err
            );
            return;
        }
    };

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_level(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init();
}
