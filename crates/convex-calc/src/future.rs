//! Single-assignment result holder for one pending calculation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use convex_calc_traits::RiskValue;

use crate::error::CalcError;

/// Outcome delivered to a future: a value (possibly an error value) or a
/// dispatch-level failure.
pub type CalcOutcome = Result<RiskValue, CalcError>;

#[derive(Default)]
struct Slot {
    outcome: Option<CalcOutcome>,
    wakers: Vec<Waker>,
}

#[derive(Default)]
struct Shared {
    slot: Mutex<Slot>,
    ready: Condvar,
}

/// Future for one (risk key, instrument) calculation.
///
/// Clones share the same slot. Resolved exactly once by the coordinator;
/// any number of threads may wait on it, and async callers may `.await` it.
#[derive(Clone, Default)]
pub struct PricingFuture {
    shared: Arc<Shared>,
}

impl PricingFuture {
    /// Create an unresolved future.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a future already resolved with `value`.
    pub fn resolved(value: RiskValue) -> Self {
        let future = Self::new();
        future.shared.slot.lock().outcome = Some(Ok(value));
        future
    }

    /// Resolve the future.
    ///
    /// Fails with [`CalcError::AlreadyResolved`] if it already holds an
    /// outcome; the first outcome is kept.
    pub fn set_result(&self, outcome: CalcOutcome) -> Result<(), CalcError> {
        let wakers = {
            let mut slot = self.shared.slot.lock();
            if slot.outcome.is_some() {
                return Err(CalcError::AlreadyResolved);
            }
            slot.outcome = Some(outcome);
            std::mem::take(&mut slot.wakers)
        };

        self.shared.ready.notify_all();
        for waker in wakers {
            waker.wake();
        }
        Ok(())
    }

    /// Non-blocking completion probe.
    pub fn is_done(&self) -> bool {
        self.shared.slot.lock().outcome.is_some()
    }

    /// Block until the future resolves, or until `timeout` elapses.
    ///
    /// Error values computed by the provider surface as [`CalcError::Value`].
    pub fn result(&self, timeout: Option<Duration>) -> CalcOutcome {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut slot = self.shared.slot.lock();

        loop {
            if let Some(outcome) = &slot.outcome {
                return unwrap_value(outcome.clone());
            }
            match deadline {
                Some(deadline) => {
                    if self.shared.ready.wait_until(&mut slot, deadline).timed_out()
                        && slot.outcome.is_none()
                    {
                        return Err(CalcError::Timeout(timeout));
                    }
                }
                None => self.shared.ready.wait(&mut slot),
            }
        }
    }

    /// Block until the future resolves, without reading the outcome.
    pub fn wait(&self) {
        let mut slot = self.shared.slot.lock();
        while slot.outcome.is_none() {
            self.shared.ready.wait(&mut slot);
        }
    }

    /// The outcome, if resolved, without blocking.
    pub fn try_result(&self) -> Option<CalcOutcome> {
        self.shared.slot.lock().outcome.clone().map(unwrap_value)
    }

    /// Returns true if both handles refer to the same future.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

fn unwrap_value(outcome: CalcOutcome) -> CalcOutcome {
    match outcome {
        Ok(RiskValue::Error(e)) => Err(CalcError::Value(e)),
        other => other,
    }
}

impl Future for PricingFuture {
    type Output = CalcOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.shared.slot.lock();
        match &slot.outcome {
            Some(outcome) => Poll::Ready(unwrap_value(outcome.clone())),
            None => {
                if !slot.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    slot.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl std::fmt::Debug for PricingFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PricingFuture")
            .field("done", &self.is_done())
            .finish()
    }
}
