//! Remote provider and session traits.
//!
//! Providers are blocking: the coordinator calls them from its own dispatch
//! threads, one per provider, so an implementation may block on network I/O
//! or poll for batch results without further ceremony.

use std::time::Duration;

use crate::error::ProviderError;
use crate::ids::{ProviderId, RequestTicket};
use crate::request::{ResultMap, RiskRequest};

/// Reply to one request passed to [`RiskProvider::calc_multi`].
#[derive(Debug, Clone)]
pub enum CalcReply {
    /// Results are available immediately
    Results(ResultMap),
    /// Request accepted in batch mode; poll with [`RiskProvider::get_results`]
    Submitted(RequestTicket),
}

/// Remote computation provider.
pub trait RiskProvider: Send + Sync {
    /// Identity used to group requests.
    fn id(&self) -> ProviderId;

    /// Submit several requests in one round trip.
    ///
    /// Returns one reply per request, in request order.
    fn calc_multi(&self, requests: &[RiskRequest]) -> Result<Vec<CalcReply>, ProviderError>;

    /// Collect results for requests submitted in batch mode.
    ///
    /// Implementations poll until every ticket completes or `timeout`
    /// elapses, in which case they return [`ProviderError::Timeout`].
    fn get_results(
        &self,
        submitted: Vec<(RequestTicket, RiskRequest)>,
        timeout: Option<Duration>,
    ) -> Result<Vec<ResultMap>, ProviderError> {
        let _ = (submitted, timeout);
        Err(ProviderError::Unsupported(format!(
            "provider {} does not support batch results",
            self.id()
        )))
    }
}

/// Authenticated session with the remote provider.
pub trait Session: Send + Sync {
    /// Acquire the session before a dispatch.
    fn acquire(&self) -> Result<(), ProviderError>;

    /// Release the session after a dispatch.
    fn release(&self);
}

/// Scoped session acquisition. Releases on drop, whatever the exit path.
#[must_use = "the session is released as soon as the scope is dropped"]
pub struct SessionScope<'a> {
    session: &'a dyn Session,
}

impl<'a> SessionScope<'a> {
    /// Acquire `session` for the lifetime of the scope.
    pub fn open(session: &'a dyn Session) -> Result<Self, ProviderError> {
        session.acquire()?;
        Ok(Self { session })
    }
}

impl Drop for SessionScope<'_> {
    fn drop(&mut self) {
        self.session.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSession {
        acquired: AtomicUsize,
        released: AtomicUsize,
        refuse: bool,
    }

    impl Session for CountingSession {
        fn acquire(&self) -> Result<(), ProviderError> {
            if self.refuse {
                return Err(ProviderError::Session("expired token".into()));
            }
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn failing_call(session: &CountingSession) -> Result<(), ProviderError> {
        let _scope = SessionScope::open(session)?;
        Err(ProviderError::Rejected("bad request".into()))
    }

    #[test]
    fn test_scope_releases_on_error_path() {
        let session = CountingSession::default();
        assert!(failing_call(&session).is_err());
        assert_eq!(session.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(session.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_acquire_does_not_release() {
        let session = CountingSession {
            refuse: true,
            ..Default::default()
        };
        assert!(matches!(
            SessionScope::open(&session),
            Err(ProviderError::Session(_))
        ));
        assert_eq!(session.released.load(Ordering::SeqCst), 0);
    }
}
