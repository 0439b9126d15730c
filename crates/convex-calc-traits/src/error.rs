//! Error types for collaborator operations.

use thiserror::Error;

/// Failure reported by a remote provider or its session.
///
/// Cloneable because one provider failure is delivered to every future
/// waiting on that provider's batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Connection to the remote provider failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The provider rejected the request
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Session could not be acquired
    #[error("session error: {0}")]
    Session(String),

    /// Batch results were not available within the timeout
    #[error("timeout")]
    Timeout,

    /// Operation not supported by this provider
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error loading or validating a context configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration file is not valid TOML for a context
    #[error("parse error: {0}")]
    Parse(String),

    /// Unknown market data location
    #[error("invalid pricing location: {0}")]
    InvalidLocation(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}
