//! Per-thread stack of entered pricing contexts.
//!
//! Each thread sees only the contexts it entered itself, so concurrent
//! callers never corrupt each other's nesting. The process-wide default
//! context is what [`ContextStack::current`] falls back to when nothing is
//! entered on the calling thread.

use std::cell::RefCell;
use std::sync::Arc;

use convex_calc_traits::ContextConfig;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::cache::ResultCache;
use crate::context::PricingContext;
use crate::error::CalcError;

thread_local! {
    static PATH: RefCell<Vec<Arc<PricingContext>>> = const { RefCell::new(Vec::new()) };
}

// Never captures the scenarios of whichever thread first touches it
static DEFAULT: Lazy<RwLock<Arc<PricingContext>>> = Lazy::new(|| {
    RwLock::new(PricingContext::from_parts(
        ContextConfig::default(),
        None,
        None,
        ResultCache::global(),
    ))
});

/// Access to the entered-context stack and the default context.
pub struct ContextStack;

impl ContextStack {
    /// Entered contexts on this thread, innermost last.
    pub fn path() -> Vec<Arc<PricingContext>> {
        PATH.with(|path| path.borrow().clone())
    }

    /// Innermost entered context on this thread.
    pub fn innermost() -> Option<Arc<PricingContext>> {
        PATH.with(|path| path.borrow().last().cloned())
    }

    /// Innermost entered context on this thread, else the default context.
    pub fn current() -> Arc<PricingContext> {
        Self::innermost().unwrap_or_else(Self::default_context)
    }

    /// The process-wide default context.
    pub fn default_context() -> Arc<PricingContext> {
        DEFAULT.read().clone()
    }

    /// Replace the process-wide default context.
    ///
    /// Fails if the new default is currently entered.
    pub fn set_default(context: Arc<PricingContext>) -> Result<(), CalcError> {
        if context.is_entered() {
            return Err(CalcError::Scope(
                "an entered context cannot become the default".to_string(),
            ));
        }
        *DEFAULT.write() = context;
        Ok(())
    }

    pub(crate) fn push(context: Arc<PricingContext>) {
        PATH.with(|path| path.borrow_mut().push(context));
    }

    /// Remove `context` from this thread's stack.
    ///
    /// Scopes normally exit innermost first; if one is dropped out of order
    /// it is removed from wherever it sits.
    pub(crate) fn pop(context: &PricingContext) -> bool {
        PATH.with(|path| {
            let mut path = path.borrow_mut();
            match path.iter().rposition(|c| c.id() == context.id()) {
                Some(pos) => {
                    path.remove(pos);
                    true
                }
                None => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convex_calc_traits::Scenario;

    #[test]
    fn test_default_context_has_no_scenario() {
        let shock = Scenario::new("rates-up-50bp");
        let _scope = shock.enter();
        assert_eq!(ContextStack::default_context().scenario(), None);
    }

    #[test]
    fn test_current_falls_back_to_default() {
        assert!(ContextStack::path().is_empty());
        assert!(ContextStack::innermost().is_none());
        assert_eq!(
            ContextStack::current().id(),
            ContextStack::default_context().id()
        );
    }
}
