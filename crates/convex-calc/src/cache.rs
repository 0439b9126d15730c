//! Result cache for instrument calculations.
//!
//! Entries are keyed by the instrument's identity token, never by the
//! instrument itself, so the cache does not keep anything alive. Each cache
//! registers itself as a [`ReleaseObserver`] and drops an instrument's entries
//! as soon as its last handle goes away.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::trace;

use convex_calc_traits::{
    observe_releases, PriceableHandle, PriceableId, ReleaseObserver, RiskKey, RiskValue,
};

static GLOBAL: Lazy<Arc<ResultCache>> = Lazy::new(ResultCache::new);

/// Two-level cache: instrument → (risk key → value).
pub struct ResultCache {
    entries: DashMap<PriceableId, HashMap<RiskKey, RiskValue>>,
}

impl ResultCache {
    /// Create a new cache and subscribe it to instrument releases.
    pub fn new() -> Arc<Self> {
        let cache = Arc::new(Self {
            entries: DashMap::new(),
        });
        let observer: Weak<dyn ReleaseObserver> = Arc::downgrade(&cache) as Weak<dyn ReleaseObserver>;
        observe_releases(observer);
        cache
    }

    /// The process-wide cache.
    pub fn global() -> Arc<ResultCache> {
        GLOBAL.clone()
    }

    /// Look up a cached value.
    pub fn get(&self, risk_key: &RiskKey, priceable: &PriceableHandle) -> Option<RiskValue> {
        self.entries
            .get(&priceable.id())
            .and_then(|results| results.get(risk_key).cloned())
    }

    /// Store a value.
    ///
    /// Error values and live-market results are not stored. Returns whether
    /// the value was stored.
    pub fn put(&self, risk_key: RiskKey, priceable: &PriceableHandle, value: RiskValue) -> bool {
        if value.is_error() || risk_key.market.is_live() {
            return false;
        }
        self.entries
            .entry(priceable.id())
            .or_default()
            .insert(risk_key, value);
        true
    }

    /// Remove every entry for an instrument.
    pub fn drop_priceable(&self, priceable: &PriceableHandle) {
        self.evict(priceable.id());
    }

    /// Remove every entry for an instrument identity.
    pub fn evict(&self, id: PriceableId) {
        if self.entries.remove(&id).is_some() {
            trace!("Evicted cached results for {}", id);
        }
    }

    /// Discard all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Whether any results are cached for the instrument.
    pub fn contains(&self, priceable: &PriceableHandle) -> bool {
        self.entries.contains_key(&priceable.id())
    }

    /// Number of instruments with cached results.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ReleaseObserver for ResultCache {
    fn priceable_released(&self, id: PriceableId) {
        self.evict(id);
    }
}
