//! Coordinator error types.

use std::time::Duration;

use thiserror::Error;

use convex_calc_traits::{ConfigError, ErrorValue, ProviderError};

/// Calculation error type.
///
/// Cloneable so a single provider failure can be delivered to every future
/// of the affected batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    /// The provider call for this calculation's batch failed
    #[error("provider error: {0}")]
    Provider(ProviderError),

    /// The provider computed an error for this instrument and measure
    #[error("calculation error: {0}")]
    Value(ErrorValue),

    /// Batch polling or a blocking wait ran out of time
    #[error("timeout")]
    Timeout(Option<Duration>),

    /// A future was resolved twice
    #[error("future already resolved")]
    AlreadyResolved,

    /// Invalid context scope use
    #[error("scope error: {0}")]
    Scope(String),

    /// The provider answered without a value for this calculation
    #[error("no result returned for {0}")]
    MissingResult(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(ConfigError),
}

impl From<ConfigError> for CalcError {
    fn from(e: ConfigError) -> Self {
        CalcError::Config(e)
    }
}
