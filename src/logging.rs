/*!
 * Log file setup
 *
 * All diagnostics, including full disk utility output, go to a plain-text
 * log file. The console only carries operator-facing messages.
 */

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

use crate::error::{AcquireError, Result};

/// Default log file name, created in the working directory
pub const DEFAULT_LOG_FILE: &str = "vhd_operation.log";

/// Where and how verbosely to log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub file: PathBuf,
    /// `error`, `warn`, `info`, `debug` or `trace`
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            file: PathBuf::from(DEFAULT_LOG_FILE),
            level: "info".to_string(),
        }
    }
}

/// Build the dispatcher writing to `settings.file`. `RUST_LOG` takes
/// precedence over the configured level.
///
/// Nothing is installed globally; the caller scopes the run with
/// [`tracing::dispatcher::with_default`].
pub fn dispatch(settings: &LogSettings) -> Result<Dispatch> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_for(&settings.level)?,
    };
    let file = open_log(&settings.file)?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file))
        .finish();
    Ok(Dispatch::new(subscriber))
}

/// Filter enabling `level` for this crate and `warn` for everything else
pub fn filter_for(level: &str) -> Result<EnvFilter> {
    let level = level.trim().to_ascii_lowercase();
    if !matches!(level.as_str(), "error" | "warn" | "info" | "debug" | "trace") {
        return Err(AcquireError::Config(format!("unknown log level '{}'", level)));
    }
    EnvFilter::try_new(format!("warn,{}={}", env!("CARGO_CRATE_NAME"), level))
        .map_err(|e| AcquireError::Config(e.to_string()))
}

fn open_log(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| AcquireError::Config(format!("cannot open log file {}: {}", path.display(), e)))
}
