//! Error handling for the device gateway
//!
//! Transport failures on a device socket are [`crate::link::LinkError`] and
//! end the session; everything else the gateway can fail with lives here.

use errors::ServiceError;
use thiserror::Error;

use crate::command::CommandError;

/// Device gateway error type
#[derive(Error, Debug, Clone)]
pub enum DevSrvError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Storage errors (SQLite device records, Redis queues)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Queued command refused before any device I/O
    #[error("Command error: {0}")]
    CommandError(#[from] CommandError),

    /// Handshake identifier did not match `[0-9A-F]{12}`
    #[error("Invalid device identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Nothing usable arrived before the handshake deadline
    #[error("Handshake error: {0}")]
    HandshakeError(String),

    /// Device or session not found
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias for the device gateway
pub type Result<T> = std::result::Result<T, DevSrvError>;

impl DevSrvError {
    pub fn config(msg: impl Into<String>) -> Self {
        DevSrvError::ConfigError(msg.into())
    }

    pub fn handshake(msg: impl Into<String>) -> Self {
        DevSrvError::HandshakeError(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        DevSrvError::NotFound(msg.into())
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<anyhow::Error> for DevSrvError {
    fn from(err: anyhow::Error) -> Self {
        DevSrvError::StorageError(format!("{:#}", err))
    }
}

impl From<figment::Error> for DevSrvError {
    fn from(err: figment::Error) -> Self {
        DevSrvError::ConfigError(err.to_string())
    }
}

impl From<DevSrvError> for ServiceError {
    fn from(err: DevSrvError) -> Self {
        match err {
            DevSrvError::ConfigError(msg) => ServiceError::Configuration(msg),
            DevSrvError::StorageError(msg) => ServiceError::Storage(msg),
            DevSrvError::CommandError(e) => ServiceError::Validation(e.to_string()),
            DevSrvError::InvalidIdentifier(id) => {
                ServiceError::Validation(format!("invalid device identifier {:?}", id))
            },
            DevSrvError::NotFound(resource) => ServiceError::NotFound { resource },
            DevSrvError::HandshakeError(msg) => ServiceError::Internal(msg),
        }
    }
}
