//! # Convex Calc Traits
//!
//! Collaborator contracts for the Convex risk request coordinator.
//!
//! This crate contains the value types and traits the coordinator consumes,
//! with no thread pools, caches or transports of its own. Implementations of
//! [`provider::RiskProvider`] and [`provider::Session`] live with whoever owns
//! the wire format to the remote pricing service.
//!
//! ## Module Structure
//!
//! - [`ids`]: Identifier newtypes (providers, priceables, batch tickets)
//! - [`market`]: Market snapshots and pricing locations
//! - [`scenario`]: Scenarios and the per-thread scenario stack
//! - [`priceable`]: The priceable contract and identity-carrying handles
//! - [`request`]: Risk measures, risk keys, outbound requests and result values
//! - [`provider`]: Remote provider and session traits
//! - [`config`]: Serializable coordination context configuration
//! - [`error`]: Provider and configuration errors
//!
//! ## Dependency Injection
//!
//! ```ignore
//! let swap = PriceableHandle::new(IrSwap::new("USD", "10y"));
//! let ctx = PricingContextBuilder::new()
//!     .with_session(session)
//!     .with_use_cache(true)
//!     .build()?;
//!
//! let pv = ctx.calc(&swap, &RiskMeasure::new("PV")).result(None)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod ids;
pub mod market;
pub mod priceable;
pub mod provider;
pub mod request;
pub mod scenario;

// Re-export commonly used types
pub use config::ContextConfig;
pub use error::{ConfigError, ProviderError};
pub use ids::*;
pub use market::{Market, PricingLocation};
pub use priceable::{observe_releases, Priceable, PriceableHandle, ReleaseObserver};
pub use provider::{CalcReply, RiskProvider, Session, SessionScope};
pub use request::{
    ErrorValue, PricingDateAndMarketDataAsOf, ResultKey, ResultMap, RiskKey, RiskMeasure,
    RiskPosition, RiskRequest, RiskRequestParameters, RiskValue,
};
pub use scenario::{MarketDataScenario, Scenario, ScenarioScope};
