/*!
Error types for the rostervault persistence engine.
*/

use std::io;
use thiserror::Error;

/// Result type used throughout the rostervault core.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Every failure a store interaction can produce.
///
/// Backends translate their native failures into one of these variants so the
/// engine's retry and fallback logic can branch on the kind of failure rather
/// than on backend-specific details.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The underlying store cannot be used at all
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A write was rejected, or the quota probe found too little headroom
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// A snapshot could not be encoded, or a stored record could not be decoded
    #[error("Serialization failure: {0}")]
    Serialization(String),

    /// No record exists under the requested key
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Logging or metrics setup failed
    #[error("Observability error: {0}")]
    Observability(String),
}

impl StoreError {
    /// Create a new unavailable error
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a new quota exceeded error
    pub fn quota_exceeded<S: Into<String>>(msg: S) -> Self {
        Self::QuotaExceeded(msg.into())
    }

    /// Create a new serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a new not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new observability error
    pub fn observability<S: Into<String>>(msg: S) -> Self {
        Self::Observability(msg.into())
    }

    /// Whether the degraded save path (prune, then one more write) may clear this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::QuotaExceeded(_))
    }

    /// Classify an I/O error raised by a filesystem-backed store
    pub fn from_io(context: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::StorageFull | io::ErrorKind::FileTooLarge => {
                Self::QuotaExceeded(format!("{context}: {err}"))
            }
            io::ErrorKind::NotFound => Self::NotFound(format!("{context}: {err}")),
            _ => Self::Unavailable(format!("{context}: {err}")),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
