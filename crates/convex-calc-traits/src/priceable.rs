//! Priceable instruments and their identity-carrying handles.
//!
//! The coordinator never compares instruments by value. Every instrument is
//! wrapped once in a [`PriceableHandle`], which assigns a [`PriceableId`];
//! clones of the handle share that identity. When the last clone is dropped,
//! registered [`ReleaseObserver`]s are told so they can purge anything keyed
//! by the id without ever holding the instrument alive themselves.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use crate::ids::PriceableId;
use crate::provider::RiskProvider;

/// An instrument or position that can be sent to a provider for calculation.
pub trait Priceable: Send + Sync + fmt::Debug {
    /// The provider that prices this instrument.
    fn provider(&self) -> Arc<dyn RiskProvider>;

    /// Position quantity sent alongside the instrument.
    fn quantity(&self) -> Decimal {
        Decimal::ONE
    }

    /// Optional display name.
    fn name(&self) -> Option<&str> {
        None
    }
}

/// Notified when the last handle to an instrument is dropped.
pub trait ReleaseObserver: Send + Sync {
    /// Called once per released instrument.
    fn priceable_released(&self, id: PriceableId);
}

static RELEASE_OBSERVERS: Lazy<RwLock<Vec<Weak<dyn ReleaseObserver>>>> =
    Lazy::new(|| RwLock::new(Vec::new()));

/// Register an observer for instrument releases.
///
/// Only a weak reference is kept; observers that have been dropped are pruned
/// on the next registration.
pub fn observe_releases(observer: Weak<dyn ReleaseObserver>) {
    let mut observers = RELEASE_OBSERVERS.write();
    observers.retain(|o| o.strong_count() > 0);
    observers.push(observer);
}

fn notify_released(id: PriceableId) {
    let observers: Vec<Arc<dyn ReleaseObserver>> = RELEASE_OBSERVERS
        .read()
        .iter()
        .filter_map(Weak::upgrade)
        .collect();

    for observer in observers {
        observer.priceable_released(id);
    }
}

struct HandleInner {
    id: PriceableId,
    priceable: Box<dyn Priceable>,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        notify_released(self.id);
    }
}

/// Shared handle to a priceable, compared by identity.
#[derive(Clone)]
pub struct PriceableHandle {
    inner: Arc<HandleInner>,
}

impl PriceableHandle {
    /// Wrap an instrument, assigning it a fresh identity.
    pub fn new(priceable: impl Priceable + 'static) -> Self {
        Self::from_boxed(Box::new(priceable))
    }

    /// Wrap an already boxed instrument.
    pub fn from_boxed(priceable: Box<dyn Priceable>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: PriceableId::next(),
                priceable,
            }),
        }
    }

    /// Identity token.
    pub fn id(&self) -> PriceableId {
        self.inner.id
    }

    /// The wrapped instrument.
    pub fn priceable(&self) -> &dyn Priceable {
        self.inner.priceable.as_ref()
    }

    /// Shortcut for `priceable().provider()`.
    pub fn provider(&self) -> Arc<dyn RiskProvider> {
        self.inner.priceable.provider()
    }

    /// Shortcut for `priceable().quantity()`.
    pub fn quantity(&self) -> Decimal {
        self.inner.priceable.quantity()
    }
}

impl PartialEq for PriceableHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for PriceableHandle {}

impl Hash for PriceableHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl PartialOrd for PriceableHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriceableHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner.id.cmp(&other.inner.id)
    }
}

impl fmt::Debug for PriceableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriceableHandle")
            .field("id", &self.inner.id)
            .field("priceable", &self.inner.priceable)
            .finish()
    }
}

impl fmt::Display for PriceableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.priceable.name() {
            Some(name) => write!(f, "{}{}", name, self.inner.id),
            None => write!(f, "{}", self.inner.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::ids::ProviderId;
    use crate::provider::CalcReply;
    use crate::request::RiskRequest;
    use parking_lot::Mutex;

    #[derive(Debug)]
    struct NullProvider;

    impl RiskProvider for NullProvider {
        fn id(&self) -> ProviderId {
            ProviderId::new("NULL")
        }

        fn calc_multi(&self, _requests: &[RiskRequest]) -> Result<Vec<CalcReply>, ProviderError> {
            Ok(Vec::new())
        }
    }

    #[derive(Debug)]
    struct Bond;

    impl Priceable for Bond {
        fn provider(&self) -> Arc<dyn RiskProvider> {
            Arc::new(NullProvider)
        }

        fn name(&self) -> Option<&str> {
            Some("UST 10Y")
        }
    }

    #[derive(Default)]
    struct Recorder {
        released: Mutex<Vec<PriceableId>>,
    }

    impl ReleaseObserver for Recorder {
        fn priceable_released(&self, id: PriceableId) {
            self.released.lock().push(id);
        }
    }

    #[test]
    fn test_clones_share_identity() {
        let a = PriceableHandle::new(Bond);
        let b = a.clone();
        let c = PriceableHandle::new(Bond);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.quantity(), Decimal::ONE);
        assert!(a.to_string().starts_with("UST 10Y#"));
    }

    #[test]
    fn test_release_notified_once_on_last_drop() {
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<dyn ReleaseObserver> = Arc::downgrade(&recorder) as Weak<dyn ReleaseObserver>;
        observe_releases(weak);

        let handle = PriceableHandle::new(Bond);
        let id = handle.id();
        let clone = handle.clone();

        drop(handle);
        assert!(!recorder.released.lock().contains(&id));

        drop(clone);
        let released = recorder.released.lock();
        assert_eq!(released.iter().filter(|r| **r == id).count(), 1);
    }
}
