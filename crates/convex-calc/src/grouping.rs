//! Request grouping - turns drained pending keys into the fewest requests.
//!
//! Grouping runs in passes over ordered maps, per provider:
//!
//! ```text
//! (params, scenario, date, market) -> { priceable -> {measures} }
//!         │
//!         ▼  invert on the sorted measure set
//! (params, scenario, date, market, measures) -> [priceables]
//!         │
//!         ▼  fold date/market variation together
//! (params, scenario, measures, priceables) -> {(date, market)}
//!         │
//!         ▼
//! one RiskRequest per group, as-of axis sorted by (date, market)
//! ```
//!
//! All maps are ordered, so the same pending set always produces the same
//! requests in the same order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;

use convex_calc_traits::{
    Market, MarketDataScenario, PriceableHandle, PricingDateAndMarketDataAsOf, ProviderId,
    ResultKey, RiskMeasure, RiskPosition, RiskProvider, RiskRequest, RiskRequestParameters,
};

/// Request-level flags copied onto every outbound request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Batch mode: ask for a ticket instead of waiting for results
    pub is_batch: bool,
    /// Request contents visible to the provider's staff
    pub visible: bool,
}

/// Everything one provider receives in a flush.
pub struct ProviderBatch {
    /// Provider identity
    pub provider_id: ProviderId,
    /// Provider to dispatch to
    pub provider: Arc<dyn RiskProvider>,
    /// Outbound requests
    pub requests: Vec<RiskRequest>,
    /// Every pending key the requests cover
    pub keys: Vec<ResultKey>,
}

impl fmt::Debug for ProviderBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderBatch")
            .field("provider_id", &self.provider_id)
            .field("requests", &self.requests.len())
            .field("keys", &self.keys.len())
            .finish()
    }
}

type SharedInputs = (
    RiskRequestParameters,
    Option<MarketDataScenario>,
    NaiveDate,
    Market,
);

type Signature = (
    RiskRequestParameters,
    Option<MarketDataScenario>,
    NaiveDate,
    Market,
    Vec<RiskMeasure>,
);

type Group = (
    RiskRequestParameters,
    Option<MarketDataScenario>,
    Vec<RiskMeasure>,
    Vec<PriceableHandle>,
);

struct ProviderWork {
    provider: Arc<dyn RiskProvider>,
    keys: Vec<ResultKey>,
    by_inputs: BTreeMap<SharedInputs, BTreeMap<PriceableHandle, BTreeSet<RiskMeasure>>>,
}

/// Group pending keys into per-provider request batches.
pub fn group_requests<'a>(
    keys: impl IntoIterator<Item = &'a ResultKey>,
    options: RequestOptions,
) -> Vec<ProviderBatch> {
    let mut by_provider: BTreeMap<ProviderId, ProviderWork> = BTreeMap::new();

    for (key, priceable) in keys {
        let work = by_provider
            .entry(key.provider.clone())
            .or_insert_with(|| ProviderWork {
                provider: priceable.provider(),
                keys: Vec::new(),
                by_inputs: BTreeMap::new(),
            });

        work.keys.push((key.clone(), priceable.clone()));
        work.by_inputs
            .entry((
                key.params.clone(),
                key.scenario.clone(),
                key.date,
                key.market.clone(),
            ))
            .or_default()
            .entry(priceable.clone())
            .or_default()
            .insert(key.risk_measure.clone());
    }

    by_provider
        .into_iter()
        .map(|(provider_id, work)| ProviderBatch {
            requests: build_requests(work.by_inputs, options),
            provider_id,
            provider: work.provider,
            keys: work.keys,
        })
        .collect()
}

fn build_requests(
    by_inputs: BTreeMap<SharedInputs, BTreeMap<PriceableHandle, BTreeSet<RiskMeasure>>>,
    options: RequestOptions,
) -> Vec<RiskRequest> {
    let mut by_signature: BTreeMap<Signature, Vec<PriceableHandle>> = BTreeMap::new();
    for ((params, scenario, date, market), positions) in by_inputs {
        for (priceable, measures) in positions {
            by_signature
                .entry((
                    params.clone(),
                    scenario.clone(),
                    date,
                    market.clone(),
                    measures.into_iter().collect(),
                ))
                .or_default()
                .push(priceable);
        }
    }

    let mut by_group: BTreeMap<Group, BTreeSet<(NaiveDate, Market)>> = BTreeMap::new();
    for ((params, scenario, date, market, measures), priceables) in by_signature {
        by_group
            .entry((params, scenario, measures, priceables))
            .or_default()
            .insert((date, market));
    }

    by_group
        .into_iter()
        .map(|((parameters, scenario, measures, priceables), dates_markets)| RiskRequest {
            positions: priceables
                .into_iter()
                .map(|p| RiskPosition {
                    quantity: p.quantity(),
                    instrument: p,
                })
                .collect(),
            measures,
            parameters,
            scenario,
            pricing_and_market_data_as_of: dates_markets
                .into_iter()
                .map(|(pricing_date, market)| PricingDateAndMarketDataAsOf {
                    pricing_date,
                    market,
                })
                .collect(),
            wait_for_results: !options.is_batch,
            request_visible: options.visible,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{date, risk_key, TestInstrument, TestProvider};
    use convex_calc_traits::{PricingLocation, Scenario};
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn key_at(provider: &str, measure: &str, d: NaiveDate) -> convex_calc_traits::RiskKey {
        let mut key = risk_key(provider, measure, Market::default());
        key.date = d;
        key
    }

    #[test]
    fn test_dates_fold_into_one_request() {
        let provider = TestProvider::arc("P");
        let a = TestInstrument::handle("a", &provider);
        let b = TestInstrument::handle("b", &provider);
        let (d1, d2) = (date(2024, 3, 1), date(2024, 3, 4));

        let keys = vec![
            (key_at("P", "PV", d2), a.clone()),
            (key_at("P", "PV", d1), a.clone()),
            (key_at("P", "PV", d2), b.clone()),
            (key_at("P", "PV", d1), b.clone()),
        ];

        let batches = group_requests(&keys, RequestOptions::default());
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].requests.len(), 1);

        let request = &batches[0].requests[0];
        assert_eq!(request.positions.len(), 2);
        let dates: Vec<_> = request
            .pricing_and_market_data_as_of
            .iter()
            .map(|a| a.pricing_date)
            .collect();
        assert_eq!(dates, vec![d1, d2]);
        assert!(request.wait_for_results);
    }

    #[test]
    fn test_measure_sets_grouped_regardless_of_insertion_order() {
        let provider = TestProvider::arc("P");
        let a = TestInstrument::handle("a", &provider);
        let b = TestInstrument::handle("b", &provider);
        let d = date(2024, 3, 1);

        let keys = vec![
            (key_at("P", "Vega", d), a.clone()),
            (key_at("P", "PV", d), a.clone()),
            (key_at("P", "PV", d), b.clone()),
            (key_at("P", "Vega", d), b.clone()),
        ];

        let batches = group_requests(&keys, RequestOptions::default());
        let requests = &batches[0].requests;
        assert_eq!(requests.len(), 1);
        let names: Vec<_> = requests[0].measures.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["PV", "Vega"]);
    }

    #[test]
    fn test_distinct_measure_sets_split() {
        let provider = TestProvider::arc("P");
        let a = TestInstrument::handle("a", &provider);
        let b = TestInstrument::handle("b", &provider);
        let d = date(2024, 3, 1);

        let keys = vec![
            (key_at("P", "PV", d), a.clone()),
            (key_at("P", "Vega", d), a.clone()),
            (key_at("P", "PV", d), b.clone()),
        ];

        let batches = group_requests(&keys, RequestOptions::default());
        assert_eq!(batches[0].requests.len(), 2);
    }

    #[test]
    fn test_scenarios_and_parameters_split() {
        let provider = TestProvider::arc("P");
        let a = TestInstrument::handle("a", &provider);
        let d = date(2024, 3, 1);

        let base = key_at("P", "PV", d);
        let mut shocked = base.clone();
        shocked.scenario = MarketDataScenario::from_path(&[Scenario::new("up-10bp")]);
        let mut other_csa = base.clone();
        other_csa.params.csa_term = Some("EUR-ESTR".to_string());

        let keys = vec![(base, a.clone()), (shocked, a.clone()), (other_csa, a)];
        let batches = group_requests(&keys, RequestOptions::default());
        assert_eq!(batches[0].requests.len(), 3);
    }

    #[test]
    fn test_one_batch_per_provider() {
        let p = TestProvider::arc("P");
        let q = TestProvider::arc("Q");
        let a = TestInstrument::handle("a", &p);
        let b = TestInstrument::handle("b", &q);
        let d = date(2024, 3, 1);

        let keys = vec![(key_at("Q", "PV", d), b), (key_at("P", "PV", d), a)];
        let batches = group_requests(
            &keys,
            RequestOptions {
                is_batch: true,
                visible: true,
            },
        );

        let ids: Vec<_> = batches.iter().map(|b| b.provider_id.as_str()).collect();
        assert_eq!(ids, vec!["P", "Q"]);
        assert!(batches
            .iter()
            .flat_map(|b| &b.requests)
            .all(|r| !r.wait_for_results && r.request_visible));
    }

    #[test]
    fn test_markets_sorted_within_date() {
        let provider = TestProvider::arc("P");
        let a = TestInstrument::handle("a", &provider);
        let d = date(2024, 3, 1);

        let mut nyc = key_at("P", "PV", d);
        nyc.market = Market::close(Some(PricingLocation::NYC));
        let mut ldn = key_at("P", "PV", d);
        ldn.market = Market::close(Some(PricingLocation::LDN));

        let keys = vec![(ldn, a.clone()), (nyc, a)];
        let batches = group_requests(&keys, RequestOptions::default());
        let request = &batches[0].requests[0];
        let markets: Vec<_> = request
            .pricing_and_market_data_as_of
            .iter()
            .map(|a| a.market.location())
            .collect();
        assert_eq!(
            markets,
            vec![Some(PricingLocation::NYC), Some(PricingLocation::LDN)]
        );
    }

    proptest! {
        #[test]
        fn prop_requests_cover_pending_keys_exactly(
            picks in proptest::collection::vec((0usize..4, 0usize..3, 0usize..3), 1..40)
        ) {
            let provider = TestProvider::arc("P");
            let instruments: Vec<_> = (0..4)
                .map(|i| TestInstrument::handle(&format!("i{}", i), &provider))
                .collect();
            let measures = ["PV", "IRDelta", "Vega"];
            let dates = [date(2024, 3, 1), date(2024, 3, 4), date(2024, 3, 5)];

            let pending: HashSet<ResultKey> = picks
                .iter()
                .map(|&(i, m, d)| (key_at("P", measures[m], dates[d]), instruments[i].clone()))
                .collect();

            let batches = group_requests(&pending, RequestOptions::default());
            let provider_id = ProviderId::new("P");
            let covered: Vec<ResultKey> = batches
                .iter()
                .flat_map(|b| b.requests.iter())
                .flat_map(|r| r.risk_keys(&provider_id).collect::<Vec<_>>())
                .collect();

            prop_assert_eq!(covered.len(), pending.len());
            let covered: HashSet<ResultKey> = covered.into_iter().collect();
            prop_assert_eq!(covered, pending);
        }
    }
}
