//! Error Module - FSP Error Types
//!
//! The pause protocol itself has no recoverable-error channel: a broken call
//! contract (double release, visiting roots without an active pause,
//! unbalanced scopes) is a bug in the caller and panics at the call site.
//!
//! The errors below cover everything around the protocol.
//!
//! # Error Categories
//!
//! ## Configuration Errors
//! - `Configuration` - Invalid configuration
//!
//! ## State Errors
//! - `InvalidState` - Operation not valid in the current runtime state

use crate::config::ConfigError;
use thiserror::Error;

/// Main error type for FSP operations
///
/// # Examples
///
/// ```rust
/// use fsp::error::FspError;
///
/// fn handle_error(err: FspError) {
///     match err {
///         FspError::Configuration(msg) => {
///             eprintln!("bad config: {}", msg);
///         }
///         _ => {
///             eprintln!("Other error: {}", err);
///         }
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum FspError {
    /// Configuration error
    ///
    /// **When returned:** `SafepointConfig::validate` rejected a value
    ///
    /// **Recovery strategy:** Use default configuration or fail fast
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid state
    ///
    /// **When returned:** Runtime lifecycle operation called out of order
    ///
    /// **Example scenario:** Attaching a mutator thread after `Runtime::stop`
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

impl FspError {
    /// Check if this error is recoverable
    ///
    /// A rejected configuration can be retried with another one. A lifecycle
    /// error means the caller drives the runtime out of order.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FspError::Configuration(_))
    }
}

impl From<ConfigError> for FspError {
    fn from(err: ConfigError) -> Self {
        FspError::Configuration(err.to_string())
    }
}

/// Result type alias for FSP operations
pub type Result<T> = std::result::Result<T, FspError>;
