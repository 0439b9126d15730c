//! Pending calculations of one context.

use std::collections::HashMap;

use convex_calc_traits::ResultKey;

use crate::future::PricingFuture;

/// Queued and in-flight futures, keyed by (risk key, instrument).
///
/// A key lives in at most one of the two maps. Queued keys move to the
/// in-flight map when a flush drains them and leave it when resolved, so a
/// pair is never dispatched twice while a result is outstanding.
#[derive(Default)]
pub(crate) struct PendingBook {
    queued: HashMap<ResultKey, PricingFuture>,
    in_flight: HashMap<ResultKey, PricingFuture>,
}

impl PendingBook {
    /// Future already registered for `key`, queued or in flight.
    pub fn find(&self, key: &ResultKey) -> Option<&PricingFuture> {
        self.queued.get(key).or_else(|| self.in_flight.get(key))
    }

    /// Queue a new future for `key`.
    pub fn register(&mut self, key: ResultKey, future: PricingFuture) {
        debug_assert!(!self.in_flight.contains_key(&key));
        self.queued.insert(key, future);
    }

    /// Move every queued entry in flight and return their keys.
    pub fn drain(&mut self) -> Vec<ResultKey> {
        let queued = std::mem::take(&mut self.queued);
        let mut keys = Vec::with_capacity(queued.len());
        for (key, future) in queued {
            keys.push(key.clone());
            self.in_flight.insert(key, future);
        }
        keys
    }

    /// Remove an in-flight entry, handing its future to the caller to resolve.
    pub fn complete(&mut self, key: &ResultKey) -> Option<PricingFuture> {
        self.in_flight.remove(key)
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }
}
