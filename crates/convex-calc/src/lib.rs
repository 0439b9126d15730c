//! # Convex Calc
//!
//! The risk request coordinator for Convex.
//!
//! This crate provides:
//! - [`PricingContext`]: Collects calculations, coalesces duplicates and
//!   dispatches them to remote providers in as few requests as possible
//! - [`PricingFuture`]: Single-assignment result handle, blocking or awaitable
//! - [`ResultCache`]: Non-owning result cache purged when instruments are released
//! - [`ContextStack`]: Per-thread stack of entered contexts and the default context
//! - [`group_requests`]: Deterministic request grouping
//!
//! ## Architecture
//!
//! ```text
//! calc() ─┬─> ResultCache hit ─────────────────────────> resolved future
//!         │
//!         └─> pending book ─> flush ─> group_requests ─┬─> provider A ─┐
//!                                                      │               ├─> futures + cache
//!                                                      └─> provider B ─┘
//! ```
//!
//! Providers are dispatched on their own threads when a flush spans several
//! providers or the context is async.
//!
//! ## Usage
//!
//! ```ignore
//! let ctx = PricingContextBuilder::new()
//!     .with_location(PricingLocation::NYC)
//!     .with_use_cache(true)
//!     .build()?;
//!
//! let futures = ctx.run(|| {
//!     swaps.iter().map(|s| ctx.calc(s, &pv)).collect::<Vec<_>>()
//! })?;
//!
//! for future in futures {
//!     println!("{:?}", future.result(None)?);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod cache;
pub mod context;
pub mod context_stack;
pub mod error;
pub mod future;
pub mod grouping;

mod dispatch;
mod pending;

#[cfg(test)]
mod test_support;

// Re-exports
pub use builder::PricingContextBuilder;
pub use cache::ResultCache;
pub use context::{ContextScope, PricingContext};
pub use context_stack::ContextStack;
pub use error::CalcError;
pub use future::{CalcOutcome, PricingFuture};
pub use grouping::{group_requests, ProviderBatch, RequestOptions};

pub use convex_calc_traits as traits;
