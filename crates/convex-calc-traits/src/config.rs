//! Coordination context configuration.
//!
//! Configuration contains:
//! - Pricing date, market and market data location
//! - Execution mode (synchronous, async, batch) and the batch timeout
//! - Caching and request visibility flags
//!
//! Configuration does NOT contain:
//! - Sessions or providers (those are injected on the builder)
//! - Scenarios (those come from the scenario stack)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::market::{Market, PricingLocation};

/// Settings for a pricing context.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Pricing date (previous business day of today when absent)
    pub pricing_date: Option<NaiveDate>,

    /// Market data location
    pub market_data_location: Option<PricingLocation>,

    /// Market (close at the data location when absent)
    pub market: Option<Market>,

    /// CSA term for the calculations
    pub csa_term: Option<String>,

    /// Return futures immediately and dispatch in the background
    pub is_async: bool,

    /// Submit requests in batch mode and poll for results
    pub is_batch: bool,

    /// Store and reuse results in the result cache
    pub use_cache: bool,

    /// Whether request contents are visible to the provider's staff
    pub visible_to_gs: bool,

    /// Batch polling timeout in milliseconds
    pub batch_results_timeout_ms: Option<u64>,
}

impl ContextConfig {
    /// Batch polling timeout.
    pub fn batch_results_timeout(&self) -> Option<Duration> {
        self.batch_results_timeout_ms.map(Duration::from_millis)
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
