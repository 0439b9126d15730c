//! Builder pattern for pricing contexts.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use convex_calc_traits::{
    ConfigError, ContextConfig, Market, MarketDataScenario, PricingLocation, Session,
};

use crate::cache::ResultCache;
use crate::context::PricingContext;
use crate::error::CalcError;

/// Builder for constructing a [`PricingContext`].
pub struct PricingContextBuilder {
    config: ContextConfig,
    scenario: Option<Option<MarketDataScenario>>,
    session: Option<Arc<dyn Session>>,
    cache: Option<Arc<ResultCache>>,
    invalid: Option<ConfigError>,
}

impl PricingContextBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::from_config(ContextConfig::default())
    }

    /// Start from a loaded configuration.
    pub fn from_config(config: ContextConfig) -> Self {
        Self {
            config,
            scenario: None,
            session: None,
            cache: None,
            invalid: None,
        }
    }

    /// Start from an existing context's settings, session, cache and scenario.
    pub fn from_context(context: &PricingContext) -> Self {
        Self {
            config: context.config(),
            scenario: Some(context.scenario().cloned()),
            session: context.session().cloned(),
            cache: Some(context.cache().clone()),
            invalid: None,
        }
    }

    /// Set the pricing date.
    pub fn with_pricing_date(mut self, date: NaiveDate) -> Self {
        self.config.pricing_date = Some(date);
        self
    }

    /// Set the market data location.
    pub fn with_location(mut self, location: PricingLocation) -> Self {
        self.config.market_data_location = Some(location);
        self
    }

    /// Set the market data location by code (`"NYC"`, `"LDN"`, ...).
    ///
    /// An unknown code fails the build.
    pub fn with_location_str(mut self, code: &str) -> Self {
        match code.parse() {
            Ok(location) => self.config.market_data_location = Some(location),
            Err(e) => self.invalid = Some(e),
        }
        self
    }

    /// Set the market explicitly.
    pub fn with_market(mut self, market: Market) -> Self {
        self.config.market = Some(market);
        self
    }

    /// Set the CSA term.
    pub fn with_csa_term(mut self, csa_term: impl Into<String>) -> Self {
        self.config.csa_term = Some(csa_term.into());
        self
    }

    /// Return futures without dispatching until flush.
    pub fn with_async(mut self, is_async: bool) -> Self {
        self.config.is_async = is_async;
        self
    }

    /// Submit requests in batch mode.
    pub fn with_batch(mut self, is_batch: bool) -> Self {
        self.config.is_batch = is_batch;
        self
    }

    /// Enable the result cache.
    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.config.use_cache = use_cache;
        self
    }

    /// Make request contents visible to the provider's staff.
    pub fn with_visible_to_gs(mut self, visible: bool) -> Self {
        self.config.visible_to_gs = visible;
        self
    }

    /// Set the batch polling timeout (millisecond precision).
    pub fn with_batch_results_timeout(mut self, timeout: Duration) -> Self {
        self.config.batch_results_timeout_ms = Some(timeout_millis(timeout));
        self
    }

    /// Override the scenario instead of capturing the thread's scenarios at build.
    pub fn with_scenario(mut self, scenario: Option<MarketDataScenario>) -> Self {
        self.scenario = Some(scenario);
        self
    }

    /// Set the session acquired around each provider dispatch.
    pub fn with_session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    /// Use a dedicated result cache instead of the process-wide one.
    pub fn with_result_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the pricing context.
    pub fn build(self) -> Result<Arc<PricingContext>, CalcError> {
        if let Some(e) = self.invalid {
            return Err(CalcError::Config(e));
        }

        let scenario = self.scenario.unwrap_or_else(MarketDataScenario::current);
        let cache = self.cache.unwrap_or_else(ResultCache::global);

        Ok(PricingContext::from_parts(
            self.config,
            scenario,
            self.session,
            cache,
        ))
    }
}

pub(crate) fn timeout_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

impl Default for PricingContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
