//! Global error handling for vhdcollect
//!
//! This module provides a centralized error type covering every fatal
//! condition of an acquisition run. Best-effort failures (metadata
//! replication, detach on a cleanup path) are not errors here; they are
//! carried as values and logged by the code that absorbs them.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::container::ScriptError;

/// Global error type for vhdcollect operations
#[derive(Error, Debug)]
pub enum AcquireError {
    /// The process is not running with administrator-equivalent privilege
    #[error("This tool requires administrator privileges. Please run as administrator.")]
    Privilege,

    /// A supplied path is not usable
    #[error("Invalid path '{path}': {reason}")]
    Validation { path: String, reason: String },

    /// Intake finished without a single source path
    #[error("No source paths were supplied")]
    NoSources,

    /// The disk-management utility reported failure
    #[error(
        "Disk utility failed to {operation} (exit code {}): {}",
        display_code(.exit_code),
        summarize_output(.stdout, .stderr)
    )]
    Provisioning {
        operation: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// File content could not be transferred into the container
    #[error("Failed to copy {} to {}: {source}", .from.display(), .to.display())]
    ContentCopy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The container could not be detached
    #[error("Failed to detach {}: {reason}", .container.display())]
    Detach { container: PathBuf, reason: String },

    /// A directive argument cannot be expressed in the utility's script language
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    /// A container operation was requested in a state that does not allow it
    #[error("Cannot {operation} a container that is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// Requested capacity exceeds what the container format supports
    #[error("Container needs {required_mb} MB but the {format} format is limited to {limit_mb} MB")]
    Capacity {
        required_mb: u64,
        limit_mb: u64,
        format: String,
    },

    /// The operator declined to continue
    #[error("Acquisition aborted by operator")]
    Aborted,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON processing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Specialized Result type for vhdcollect operations
pub type Result<T> = std::result::Result<T, AcquireError>;

impl AcquireError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Privilege => 2,
            Self::Validation { .. } | Self::NoSources => 3,
            Self::Aborted => 4,
            _ => 1,
        }
    }

    /// Build a validation error for a path
    pub fn validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

/// Last meaningful line of the utility's output, for one-line error display.
/// The full output stays on the error value and in the log.
fn summarize_output(stdout: &str, stderr: &str) -> String {
    stderr
        .lines()
        .chain(stdout.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .unwrap_or("no output captured")
        .to_string()
}

/// Creates an AcquireError with a formatted message
#[macro_export]
macro_rules! error {
    ($error_type:ident, $($arg:tt)*) => {
        $crate::error::AcquireError::$error_type(format!($($arg)*))
    };
}

/// Returns an error result with a formatted message
#[macro_export]
macro_rules! bail {
    ($error_type:ident, $($arg:tt)*) => {
        return Err($crate::error!($error_type, $($arg)*))
    };
}

/// Ensures a condition is true, otherwise returns an error
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $error_type:ident, $($arg:tt)*) => {
        if !($cond) {
            $crate::bail!($error_type, $($arg)*)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisioning_error_shows_last_output_line() {
        let err = AcquireError::Provisioning {
            operation: "create container".to_string(),
            exit_code: Some(-2147024809),
            stdout: "DiskPart successfully created the virtual disk file.\n\nVirtual Disk Service error:\nThe file exists.\n\n"
                .to_string(),
            stderr: String::new(),
        };

        let message = err.to_string();
        assert!(message.contains("create container"));
        assert!(message.contains("-2147024809"));
        assert!(message.ends_with("The file exists."));
    }

    #[test]
    fn provisioning_error_without_output() {
        let err = AcquireError::Provisioning {
            operation: "detach container".to_string(),
            exit_code: None,
            stdout: String::new(),
            stderr: "  \n".to_string(),
        };

        assert!(err.to_string().contains("exit code none"));
        assert!(err.to_string().ends_with("no output captured"));
    }

    #[test]
    fn exit_codes_by_category() {
        assert_eq!(AcquireError::Privilege.exit_code(), 2);
        assert_eq!(AcquireError::NoSources.exit_code(), 3);
        assert_eq!(AcquireError::validation("x", "missing").exit_code(), 3);
        assert_eq!(AcquireError::Aborted.exit_code(), 4);
        assert_eq!(crate::error!(Config, "bad {}", 1).exit_code(), 1);
    }
}
