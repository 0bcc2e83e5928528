//! Error types for regfile-core

use thiserror::Error;

/// Result type alias for registrar operations
pub type Result<T> = std::result::Result<T, RegistrarError>;

/// Main error type for registrar operations
///
/// None of these are faults of the registrar itself. `NotFound` and
/// `Rejected` are negative answers to a request, `Unhandled` tells the host
/// that another handler may take the request instead.
#[derive(Error, Debug)]
pub enum RegistrarError {
    /// No matching identity, profile or registration
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request or identity refused by policy
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Request outside this registrar's concern (empty or reserved identity)
    #[error("Unhandled: {0}")]
    Unhandled(String),

    /// Configuration or profile file error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Registration storage error
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistrarError {
    /// Whether the host should let a fallback handler act on the request
    pub fn is_unhandled(&self) -> bool {
        matches!(self, RegistrarError::Unhandled(_))
    }
}

impl From<toml::de::Error> for RegistrarError {
    fn from(err: toml::de::Error) -> Self {
        RegistrarError::ConfigError(err.to_string())
    }
}

impl From<toml::ser::Error> for RegistrarError {
    fn from(err: toml::ser::Error) -> Self {
        RegistrarError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for RegistrarError {
    fn from(err: serde_json::Error) -> Self {
        RegistrarError::StorageError(format!("JSON error: {}", err))
    }
}
