//! Error handling for the deimos driver
//!
//! Runtime failures are returned as [`ScanError`]. The only panic in the
//! crate is an out-of-range TTL passed to the argument builder.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Main error type for driver operations
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("masscan is not installed")]
    NotInstalled,

    #[error("path does not exist: {}", .0.display())]
    BinaryNotFound(PathBuf),

    #[error("scan timeout")]
    TimeoutError,

    #[error("parse result error")]
    ParseError,

    #[error("XML decode error: {0}")]
    XmlError(#[from] quick_xml::DeError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("masscan exited with {0}")]
    ExitStatusError(ExitStatus),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type alias for driver operations
pub type ScanResult<T> = Result<T, ScanError>;

impl ScanError {
    /// True when the run was cut short by its cancellation token
    pub fn is_timeout(&self) -> bool {
        matches!(self, ScanError::TimeoutError)
    }

    /// True for failures to locate the engine binary
    pub fn is_missing_binary(&self) -> bool {
        matches!(self, ScanError::NotInstalled | ScanError::BinaryNotFound(_))
    }
}

impl From<toml::de::Error> for ScanError {
    fn from(e: toml::de::Error) -> Self {
        ScanError::ConfigError(e.to_string())
    }
}
