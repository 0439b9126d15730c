//! Pricing context - the request coordinator.
//!
//! A context collects calculations requested with [`PricingContext::calc`],
//! and on flush groups them into the fewest provider requests, dispatches
//! them, and resolves one [`PricingFuture`] per requested pair.
//!
//! ```ignore
//! let ctx = PricingContextBuilder::new().with_use_cache(true).build()?;
//!
//! // Inside a scope, requests accumulate and go out together on exit
//! let (pv, delta) = ctx.run(|| {
//!     (ctx.calc(&swap, &pv_measure), ctx.calc(&swap, &delta_measure))
//! })?;
//!
//! // Outside a scope, a synchronous context dispatches immediately
//! let vega = ctx.calc(&swaption, &vega_measure).result(None)?;
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDate, Weekday};
use parking_lot::Mutex;
use rayon::ThreadPoolBuilder;
use tracing::{debug, warn};
use uuid::Uuid;

use convex_calc_traits::{
    ContextConfig, Market, MarketDataScenario, PriceableHandle, PricingLocation, ProviderId,
    RiskKey, RiskMeasure, RiskRequestParameters, Session,
};

use crate::builder::{timeout_millis, PricingContextBuilder};
use crate::cache::ResultCache;
use crate::context_stack::ContextStack;
use crate::dispatch::Dispatcher;
use crate::error::CalcError;
use crate::future::PricingFuture;
use crate::grouping::{group_requests, RequestOptions};
use crate::pending::PendingBook;

/// Today rolled back to the previous weekday.
pub(crate) fn default_pricing_date() -> NaiveDate {
    let today = Local::now().date_naive();
    match today.weekday() {
        Weekday::Sat => today - chrono::Duration::days(1),
        Weekday::Sun => today - chrono::Duration::days(2),
        _ => today,
    }
}

/// Coordinates risk calculations for one configuration.
///
/// Always handled through an `Arc`; build one with [`PricingContextBuilder`].
pub struct PricingContext {
    id: Uuid,
    pricing_date: NaiveDate,
    market: Market,
    market_data_location: Option<PricingLocation>,
    csa_term: Option<String>,
    scenario: Option<MarketDataScenario>,
    is_async: bool,
    is_batch: bool,
    use_cache: bool,
    visible_to_gs: bool,
    batch_results_timeout: Option<Duration>,
    session: Option<Arc<dyn Session>>,
    cache: Arc<ResultCache>,
    entered: AtomicBool,
    book: Arc<Mutex<PendingBook>>,
}

impl PricingContext {
    /// Context for `config`, with the current thread's scenarios, no session
    /// and the process-wide cache.
    pub fn new(config: ContextConfig) -> Arc<Self> {
        Self::from_parts(
            config,
            MarketDataScenario::current(),
            None,
            ResultCache::global(),
        )
    }

    /// Builder with default settings.
    pub fn builder() -> PricingContextBuilder {
        PricingContextBuilder::new()
    }

    pub(crate) fn from_parts(
        config: ContextConfig,
        scenario: Option<MarketDataScenario>,
        session: Option<Arc<dyn Session>>,
        cache: Arc<ResultCache>,
    ) -> Arc<Self> {
        let batch_results_timeout = config.batch_results_timeout();
        let ContextConfig {
            pricing_date,
            market_data_location,
            market,
            csa_term,
            is_async,
            is_batch,
            use_cache,
            visible_to_gs,
            ..
        } = config;

        Arc::new(Self {
            id: Uuid::new_v4(),
            pricing_date: pricing_date.unwrap_or_else(default_pricing_date),
            market: market.unwrap_or_else(|| Market::close(market_data_location)),
            market_data_location,
            csa_term,
            scenario,
            is_async,
            is_batch,
            use_cache,
            visible_to_gs,
            batch_results_timeout,
            session,
            cache,
            entered: AtomicBool::new(false),
            book: Arc::new(Mutex::new(PendingBook::default())),
        })
    }

    // =========================================================================
    // CALCULATION
    // =========================================================================

    /// Request `risk_measure` for `priceable`.
    ///
    /// The request is registered with the active context. A duplicate of a
    /// pending request returns the pending future; a cached result returns an
    /// already completed one. If this context is neither entered nor async,
    /// it flushes before returning, so the future is resolved on return even
    /// when another thread already dispatched the same pair.
    pub fn calc(
        self: &Arc<Self>,
        priceable: &PriceableHandle,
        risk_measure: &RiskMeasure,
    ) -> PricingFuture {
        let active = self.active_context();
        let risk_key = self.risk_key(risk_measure, priceable.provider().id());

        let future = {
            let mut book = active.book.lock();
            let key = (risk_key, priceable.clone());

            match book.find(&key).cloned() {
                Some(future) => future,
                None => {
                    let cached = if self.use_cache {
                        self.cache.get(&key.0, priceable)
                    } else {
                        None
                    };

                    match cached {
                        Some(value) => PricingFuture::resolved(value),
                        None => {
                            let future = PricingFuture::new();
                            book.register(key, future.clone());
                            future
                        }
                    }
                }
            }
        };

        if !(self.is_entered() || self.is_async) {
            self.flush();
            // Registered elsewhere, the future resolves when that scope exits
            if Arc::ptr_eq(&active, self) {
                future.wait();
            }
        }

        future
    }

    /// Request several measures for several instruments.
    ///
    /// Futures are returned instrument-major: every measure for the first
    /// instrument, then every measure for the second, and so on. Requests
    /// route like [`calc`](Self::calc); when no context is entered on this
    /// thread, this context is entered so they go out in one flush.
    pub fn calc_all(
        self: &Arc<Self>,
        priceables: &[PriceableHandle],
        risk_measures: &[RiskMeasure],
    ) -> Result<Vec<PricingFuture>, CalcError> {
        let run = || {
            priceables
                .iter()
                .flat_map(|p| risk_measures.iter().map(move |m| (p, m)))
                .map(|(p, m)| self.calc(p, m))
                .collect::<Vec<_>>()
        };

        if self.active_context().is_entered() {
            Ok(run())
        } else {
            self.run(run)
        }
    }

    /// Drain pending calculations and dispatch them.
    ///
    /// Returns once every drained future is resolved, unless the context is
    /// async, in which case dispatch continues in the background.
    pub fn flush(&self) {
        let keys = self.book.lock().drain();
        if keys.is_empty() {
            return;
        }

        let batches = group_requests(
            &keys,
            RequestOptions {
                is_batch: self.is_batch,
                visible: self.visible_to_gs,
            },
        );
        debug!(
            "Context {} flushing {} calculations across {} providers",
            self.id,
            keys.len(),
            batches.len()
        );

        let dispatcher = self.dispatcher();
        if batches.len() == 1 && !self.is_async {
            for batch in batches {
                dispatcher.run(batch);
            }
            return;
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(batches.len())
            .thread_name(|i| format!("convex-calc-dispatch-{}", i))
            .build();

        match pool {
            Ok(pool) if self.is_async => {
                for batch in batches {
                    let dispatcher = dispatcher.clone();
                    pool.spawn(move || dispatcher.run(batch));
                }
            }
            Ok(pool) => {
                pool.scope(|s| {
                    for batch in batches {
                        let dispatcher = &dispatcher;
                        s.spawn(move |_| dispatcher.run(batch));
                    }
                });
            }
            Err(e) => {
                warn!("Dispatch pool unavailable ({}), dispatching inline", e);
                for batch in batches {
                    dispatcher.run(batch);
                }
            }
        }
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            book: self.book.clone(),
            cache: self.use_cache.then(|| self.cache.clone()),
            session: self.session.clone(),
            is_batch: self.is_batch,
            batch_results_timeout: self.batch_results_timeout,
        }
    }

    fn risk_key(&self, risk_measure: &RiskMeasure, provider: ProviderId) -> RiskKey {
        RiskKey {
            provider,
            date: self.pricing_date,
            market: self.market.clone(),
            params: self.parameters(),
            scenario: self.scenario.clone(),
            risk_measure: risk_measure.clone(),
        }
    }

    fn parameters(&self) -> RiskRequestParameters {
        RiskRequestParameters {
            csa_term: self.csa_term.clone(),
            raw_results: true,
        }
    }

    // =========================================================================
    // SCOPES
    // =========================================================================

    /// Enter the context on the current thread.
    ///
    /// Calculations requested while the scope is open accumulate and are
    /// flushed when it is dropped.
    pub fn enter(self: &Arc<Self>) -> Result<ContextScope, CalcError> {
        if self.entered.swap(true, Ordering::SeqCst) {
            return Err(CalcError::Scope(format!(
                "context {} is already entered",
                self.id
            )));
        }

        ContextStack::push(self.clone());
        debug!("Entered context {}", self.id);
        Ok(ContextScope {
            context: self.clone(),
            _not_send: PhantomData,
        })
    }

    /// Run `f` inside the context's scope.
    ///
    /// The scope is flushed on the way out even if `f` fails or panics; a
    /// failure returned by `f` reaches the caller untouched.
    pub fn run<T>(self: &Arc<Self>, f: impl FnOnce() -> T) -> Result<T, CalcError> {
        let _scope = self.enter()?;
        Ok(f())
    }

    fn exit(&self) {
        ContextStack::pop(self);
        self.entered.store(false, Ordering::SeqCst);
        debug!("Exiting context {}", self.id);
        self.flush();
    }

    /// Innermost context entered on this thread, or this context if none is.
    pub fn active_context(self: &Arc<Self>) -> Arc<PricingContext> {
        ContextStack::path()
            .into_iter()
            .rev()
            .find(|c| c.is_entered())
            .unwrap_or_else(|| self.clone())
    }

    /// Whether this is the context [`ContextStack::current`] resolves to.
    pub fn is_current(&self) -> bool {
        ContextStack::current().id == self.id
    }

    /// Whether a scope is currently open on this context.
    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }

    // =========================================================================
    // CONFIGURATION
    // =========================================================================

    /// New context with this context's settings, except for `overrides`.
    ///
    /// ```ignore
    /// let batch = ctx.clone_with(|b| b.with_batch(true).with_batch_results_timeout(timeout))?;
    /// ```
    pub fn clone_with(
        &self,
        overrides: impl FnOnce(PricingContextBuilder) -> PricingContextBuilder,
    ) -> Result<Arc<PricingContext>, CalcError> {
        overrides(PricingContextBuilder::from_context(self)).build()
    }

    /// Settings of this context as a configuration.
    pub fn config(&self) -> ContextConfig {
        ContextConfig {
            pricing_date: Some(self.pricing_date),
            market_data_location: self.market_data_location,
            market: Some(self.market.clone()),
            csa_term: self.csa_term.clone(),
            is_async: self.is_async,
            is_batch: self.is_batch,
            use_cache: self.use_cache,
            visible_to_gs: self.visible_to_gs,
            batch_results_timeout_ms: self.batch_results_timeout.map(timeout_millis),
        }
    }

    /// Unique context id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Pricing date.
    pub fn pricing_date(&self) -> NaiveDate {
        self.pricing_date
    }

    /// Market calculations are priced against.
    pub fn market(&self) -> &Market {
        &self.market
    }

    /// Market data location.
    pub fn market_data_location(&self) -> Option<PricingLocation> {
        self.market_data_location
    }

    /// CSA term.
    pub fn csa_term(&self) -> Option<&str> {
        self.csa_term.as_deref()
    }

    /// Scenario captured when the context was built.
    pub fn scenario(&self) -> Option<&MarketDataScenario> {
        self.scenario.as_ref()
    }

    /// Whether `calc` returns without dispatching.
    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// Whether requests are submitted in batch mode.
    pub fn is_batch(&self) -> bool {
        self.is_batch
    }

    /// Batch polling timeout.
    pub fn batch_results_timeout(&self) -> Option<Duration> {
        self.batch_results_timeout
    }

    /// Cache results.
    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    /// Request contents visible to the provider's staff.
    pub fn visible_to_gs(&self) -> bool {
        self.visible_to_gs
    }

    pub(crate) fn session(&self) -> Option<&Arc<dyn Session>> {
        self.session.as_ref()
    }

    /// Result cache used by this context.
    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Number of calculations queued and not yet dispatched.
    pub fn pending_count(&self) -> usize {
        self.book.lock().queued_len()
    }

    /// Number of calculations dispatched and not yet resolved.
    pub fn in_flight_count(&self) -> usize {
        self.book.lock().in_flight_len()
    }
}

impl fmt::Debug for PricingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PricingContext")
            .field("id", &self.id)
            .field("pricing_date", &self.pricing_date)
            .field("market", &self.market)
            .field("is_async", &self.is_async)
            .field("is_batch", &self.is_batch)
            .field("use_cache", &self.use_cache)
            .field("entered", &self.is_entered())
            .finish()
    }
}

/// Open scope on a [`PricingContext`], returned by [`PricingContext::enter`].
///
/// Dropping it pops the context off this thread's stack and flushes it. Not
/// `Send`: scopes belong to the thread that entered them.
#[must_use = "the context is exited and flushed as soon as the scope is dropped"]
pub struct ContextScope {
    context: Arc<PricingContext>,
    _not_send: PhantomData<*const ()>,
}

impl ContextScope {
    /// The entered context.
    pub fn context(&self) -> &Arc<PricingContext> {
        &self.context
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        if std::thread::panicking() {
            warn!(
                "Context {} exited by a panic, flushing pending calculations",
                self.context.id
            );
        }
        self.context.exit();
    }
}
