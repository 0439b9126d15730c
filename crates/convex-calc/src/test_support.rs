//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use convex_calc_traits::{
    CalcReply, Market, Priceable, PriceableHandle, ProviderError, ProviderId, RequestTicket,
    ResultMap, RiskKey, RiskMeasure, RiskProvider, RiskRequest, RiskRequestParameters, RiskValue,
    Session,
};

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub(crate) fn risk_key(provider: &str, measure: &str, market: Market) -> RiskKey {
    RiskKey {
        provider: ProviderId::new(provider),
        date: date(2024, 3, 1),
        market,
        params: RiskRequestParameters {
            csa_term: None,
            raw_results: true,
        },
        scenario: None,
        risk_measure: RiskMeasure::new(measure),
    }
}

/// Provider that answers every calculation with `value_for` and records the
/// requests it receives.
pub(crate) struct TestProvider {
    id: ProviderId,
    pub calls: Mutex<Vec<Vec<RiskRequest>>>,
    pub polls: Mutex<Vec<Option<Duration>>>,
    pub fail_with: Mutex<Option<ProviderError>>,
    pub delay: Mutex<Option<Duration>>,
    /// Measure the provider silently leaves out of its results
    pub omit_measure: Mutex<Option<String>>,
    pub value_for: fn(&RiskKey) -> RiskValue,
    tickets: AtomicUsize,
}

impl TestProvider {
    pub fn arc(id: &str) -> Arc<Self> {
        Self::with_values(id, |_| RiskValue::Float(42.0))
    }

    pub fn with_values(id: &str, value_for: fn(&RiskKey) -> RiskValue) -> Arc<Self> {
        Arc::new(Self {
            id: ProviderId::new(id),
            calls: Mutex::new(Vec::new()),
            polls: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
            delay: Mutex::new(None),
            omit_measure: Mutex::new(None),
            value_for,
            tickets: AtomicUsize::new(0),
        })
    }

    pub fn request_count(&self) -> usize {
        self.calls.lock().iter().map(Vec::len).sum()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn results_for(&self, request: &RiskRequest) -> ResultMap {
        let omit = self.omit_measure.lock().clone();
        request
            .risk_keys(&self.id)
            .filter(|(key, _)| omit.as_deref() != Some(key.risk_measure.name.as_str()))
            .map(|(key, priceable)| {
                let value = (self.value_for)(&key);
                ((key, priceable), value)
            })
            .collect()
    }
}

impl RiskProvider for TestProvider {
    fn id(&self) -> ProviderId {
        self.id.clone()
    }

    fn calc_multi(&self, requests: &[RiskRequest]) -> Result<Vec<CalcReply>, ProviderError> {
        if let Some(delay) = *self.delay.lock() {
            std::thread::sleep(delay);
        }
        self.calls.lock().push(requests.to_vec());
        if let Some(err) = self.fail_with.lock().clone() {
            return Err(err);
        }

        Ok(requests
            .iter()
            .map(|r| {
                if r.wait_for_results {
                    CalcReply::Results(self.results_for(r))
                } else {
                    let n = self.tickets.fetch_add(1, Ordering::SeqCst);
                    CalcReply::Submitted(RequestTicket::new(format!("{}-{}", self.id, n)))
                }
            })
            .collect())
    }

    fn get_results(
        &self,
        submitted: Vec<(RequestTicket, RiskRequest)>,
        timeout: Option<Duration>,
    ) -> Result<Vec<ResultMap>, ProviderError> {
        self.polls.lock().push(timeout);
        Ok(submitted
            .iter()
            .map(|(_, request)| self.results_for(request))
            .collect())
    }
}

#[derive(Debug)]
pub(crate) struct TestInstrument {
    name: String,
    provider: Arc<TestProvider>,
    quantity: Decimal,
}

impl std::fmt::Debug for TestProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TestProvider({})", self.id)
    }
}

impl TestInstrument {
    pub fn handle(name: &str, provider: &Arc<TestProvider>) -> PriceableHandle {
        PriceableHandle::new(TestInstrument {
            name: name.to_string(),
            provider: provider.clone(),
            quantity: Decimal::ONE,
        })
    }
}

impl Priceable for TestInstrument {
    fn provider(&self) -> Arc<dyn RiskProvider> {
        self.provider.clone()
    }

    fn quantity(&self) -> Decimal {
        self.quantity
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

#[derive(Default)]
pub(crate) struct TestSession {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
}

impl Session for TestSession {
    fn acquire(&self) -> Result<(), ProviderError> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}
