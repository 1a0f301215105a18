//! Error types for the Xyston library.
//!
//! All fallible operations in Xyston return [`Result`], whose error type is
//! the [`XystonError`] enum. The taxonomy distinguishes permanent failures
//! (a backend that cannot be set up on this host) from transient ones
//! (a remote index that timed out), so callers can decide whether a retry
//! against the same or a different strategy makes sense.
//!
//! # Examples
//!
//! ```
//! use xyston::error::{Result, XystonError};
//!
//! fn example_operation() -> Result<()> {
//!     Err(XystonError::invalid_argument("limit must be greater than zero"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use anyhow;
use thiserror::Error;

/// The main error type for Xyston operations.
#[derive(Error, Debug)]
pub enum XystonError {
    /// Backend setup failed (device acquisition, catalog preparation).
    /// Fatal for that strategy instance, not for the process.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// An operation was attempted on a strategy before `initialize` completed.
    #[error("Strategy '{0}' is not initialized")]
    NotInitialized(String),

    /// A switch targeted a strategy name that was never registered.
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    /// A switch targeted a registered strategy that is unavailable on this host.
    #[error("Strategy '{0}' is not available on this host")]
    UnavailableStrategy(String),

    /// No registered backend can serve any request.
    #[error("No search strategy is available")]
    NoStrategyAvailable,

    /// A remote index call failed transiently (network, timeout). Retryable.
    #[error("Remote index degraded: {0}")]
    RemoteDegraded(String),

    /// A caller violated an argument contract.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O errors from client implementations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors from client implementations.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic anyhow error.
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with [`XystonError`].
pub type Result<T> = std::result::Result<T, XystonError>;

impl XystonError {
    /// Create a new initialization error.
    pub fn initialization<S: Into<String>>(msg: S) -> Self {
        XystonError::Initialization(msg.into())
    }

    /// Create a new not-initialized error for the named strategy.
    pub fn not_initialized<S: Into<String>>(strategy: S) -> Self {
        XystonError::NotInitialized(strategy.into())
    }

    /// Create a new unknown-strategy error.
    pub fn unknown_strategy<S: Into<String>>(name: S) -> Self {
        XystonError::UnknownStrategy(name.into())
    }

    /// Create a new unavailable-strategy error.
    pub fn unavailable_strategy<S: Into<String>>(name: S) -> Self {
        XystonError::UnavailableStrategy(name.into())
    }

    /// Create a new remote-degraded error.
    pub fn remote_degraded<S: Into<String>>(msg: S) -> Self {
        XystonError::RemoteDegraded(msg.into())
    }

    /// Create a new invalid-argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        XystonError::InvalidArgument(msg.into())
    }

    /// True if the failure is transient and worth retrying against the
    /// same strategy; false for permanent failures.
    pub fn is_transient(&self) -> bool {
        matches!(self, XystonError::RemoteDegraded(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = XystonError::initialization("device unavailable");
        assert_eq!(
            error.to_string(),
            "Initialization error: device unavailable"
        );

        let error = XystonError::unknown_strategy("hnsw");
        assert_eq!(error.to_string(), "Unknown strategy: hnsw");

        let error = XystonError::not_initialized("parallel");
        assert_eq!(error.to_string(), "Strategy 'parallel' is not initialized");
    }

    #[test]
    fn test_transient_classification() {
        assert!(XystonError::remote_degraded("timeout").is_transient());
        assert!(!XystonError::NoStrategyAvailable.is_transient());
        assert!(!XystonError::initialization("bad catalog").is_transient());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "connection refused");
        let xyston_error = XystonError::from(io_error);

        match xyston_error {
            XystonError::Io(_) => {}
            _ => panic!("Expected IO error variant"),
        }
    }
}
