//! Provider dispatch and future resolution.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use convex_calc_traits::{
    CalcReply, ProviderError, ResultKey, ResultMap, RiskProvider, RiskRequest, RiskValue, Session,
    SessionScope,
};

use crate::cache::ResultCache;
use crate::error::CalcError;
use crate::future::{CalcOutcome, PricingFuture};
use crate::grouping::ProviderBatch;
use crate::pending::PendingBook;

/// Everything a dispatch job needs from its context.
///
/// Owned and cloneable so async flushes can hand it to pool threads that
/// outlive the flush call.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    pub book: Arc<Mutex<PendingBook>>,
    /// Present when the context caches results
    pub cache: Option<Arc<ResultCache>>,
    pub session: Option<Arc<dyn Session>>,
    pub is_batch: bool,
    pub batch_results_timeout: Option<Duration>,
}

impl Dispatcher {
    /// Send one provider's requests and resolve every future they cover.
    pub fn run(&self, batch: ProviderBatch) {
        let ProviderBatch {
            provider_id,
            provider,
            requests,
            keys,
        } = batch;

        debug!(
            "Dispatching {} requests ({} calculations) to {}",
            requests.len(),
            keys.len(),
            provider_id
        );

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.call_provider(provider.as_ref(), requests)
        }))
        .unwrap_or_else(|_| {
            Err(ProviderError::Internal(format!(
                "provider {} panicked",
                provider_id
            )))
        });

        match outcome {
            Ok(results) => self.resolve(results, &keys),
            Err(e) => {
                warn!("Provider {} failed: {}", provider_id, e);
                let err = match e {
                    ProviderError::Timeout => CalcError::Timeout(self.batch_results_timeout),
                    other => CalcError::Provider(other),
                };
                self.fail(&keys, err);
            }
        }
    }

    fn call_provider(
        &self,
        provider: &dyn RiskProvider,
        requests: Vec<RiskRequest>,
    ) -> Result<Vec<ResultMap>, ProviderError> {
        let _session = match &self.session {
            Some(session) => Some(SessionScope::open(session.as_ref())?),
            None => None,
        };

        let replies = provider.calc_multi(&requests)?;
        if replies.len() != requests.len() {
            warn!(
                "Provider {} returned {} replies for {} requests",
                provider.id(),
                replies.len(),
                requests.len()
            );
        }

        let mut results = Vec::with_capacity(replies.len());
        let mut submitted = Vec::new();
        for (reply, request) in replies.into_iter().zip(requests) {
            match reply {
                CalcReply::Results(map) => results.push(map),
                CalcReply::Submitted(ticket) if self.is_batch => submitted.push((ticket, request)),
                CalcReply::Submitted(ticket) => {
                    warn!("Ignoring batch ticket {} outside batch mode", ticket);
                }
            }
        }

        if !submitted.is_empty() {
            debug!(
                "Polling {} for {} batch requests (timeout {:?})",
                provider.id(),
                submitted.len(),
                self.batch_results_timeout
            );
            results.extend(provider.get_results(submitted, self.batch_results_timeout)?);
        }

        Ok(results)
    }

    fn resolve(&self, results: Vec<ResultMap>, keys: &[ResultKey]) {
        let values: Vec<(ResultKey, RiskValue)> = results.into_iter().flatten().collect();

        if let Some(cache) = &self.cache {
            for ((risk_key, priceable), value) in &values {
                cache.put(risk_key.clone(), priceable, value.clone());
            }
        }

        let (resolved, missing) = {
            let mut book = self.book.lock();
            let resolved: Vec<(PricingFuture, RiskValue)> = values
                .into_iter()
                .filter_map(|(key, value)| match book.complete(&key) {
                    Some(future) => Some((future, value)),
                    None => {
                        trace!("Result for {} {} has no pending future", key.0, key.1);
                        None
                    }
                })
                .collect();
            let missing: Vec<(PricingFuture, &ResultKey)> = keys
                .iter()
                .filter_map(|key| book.complete(key).map(|future| (future, key)))
                .collect();
            (resolved, missing)
        };

        for (future, value) in resolved {
            settle(&future, Ok(value));
        }

        if !missing.is_empty() {
            warn!("{} calculations returned no result", missing.len());
        }
        for (future, (risk_key, priceable)) in missing {
            settle(
                &future,
                Err(CalcError::MissingResult(format!("{} {}", risk_key, priceable))),
            );
        }
    }

    fn fail(&self, keys: &[ResultKey], err: CalcError) {
        let futures: Vec<PricingFuture> = {
            let mut book = self.book.lock();
            keys.iter().filter_map(|key| book.complete(key)).collect()
        };

        for future in futures {
            settle(&future, Err(err.clone()));
        }
    }
}

fn settle(future: &PricingFuture, outcome: CalcOutcome) {
    if let Err(e) = future.set_result(outcome) {
        error!("Coordination bug: {}", e);
        debug_assert!(false, "pending future resolved twice");
    }
}
