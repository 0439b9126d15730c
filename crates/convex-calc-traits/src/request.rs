//! Risk measures, risk keys, outbound requests and result values.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::ids::ProviderId;
use crate::market::Market;
use crate::priceable::PriceableHandle;
use crate::scenario::MarketDataScenario;

// =============================================================================
// RISK MEASURES AND KEYS
// =============================================================================

/// A risk measure to compute (PV, IR delta, vega...).
///
/// Opaque to the coordinator beyond equality and ordering; measure sets are
/// sorted before requests are grouped.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RiskMeasure {
    /// Measure name, e.g. "IRDelta"
    pub name: String,
    /// Asset class qualifier
    pub asset_class: Option<String>,
    /// Unit qualifier, e.g. "BP"
    pub unit: Option<String>,
}

impl RiskMeasure {
    /// Create a measure with no qualifiers.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            asset_class: None,
            unit: None,
        }
    }

    /// Set the asset class.
    pub fn with_asset_class(mut self, asset_class: impl Into<String>) -> Self {
        self.asset_class = Some(asset_class.into());
        self
    }

    /// Set the unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

impl fmt::Display for RiskMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(unit) = &self.unit {
            write!(f, "[{}]", unit)?;
        }
        Ok(())
    }
}

/// Request-wide calculation parameters.
#[derive(Debug, Clone, Default, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RiskRequestParameters {
    /// CSA term the calculation is made under (local OIS when absent)
    pub csa_term: Option<String>,
    /// Ask the provider for unaggregated results
    pub raw_results: bool,
}

/// Composite identity of one calculation.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct RiskKey {
    /// Provider that computes it
    pub provider: ProviderId,
    /// Pricing date
    pub date: NaiveDate,
    /// Market the calculation is priced against
    pub market: Market,
    /// Request parameters
    pub params: RiskRequestParameters,
    /// Scenario, if any
    pub scenario: Option<MarketDataScenario>,
    /// Risk measure
    pub risk_measure: RiskMeasure,
}

impl RiskKey {
    /// Copy of this key with a different risk measure.
    pub fn with_measure(&self, risk_measure: RiskMeasure) -> Self {
        Self {
            risk_measure,
            ..self.clone()
        }
    }
}

impl fmt::Display for RiskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{}/{}",
            self.provider, self.risk_measure, self.date, self.market
        )
    }
}

// =============================================================================
// OUTBOUND REQUESTS
// =============================================================================

/// One instrument in an outbound request.
#[derive(Debug, Clone)]
pub struct RiskPosition {
    /// The instrument
    pub instrument: PriceableHandle,
    /// Position quantity
    pub quantity: Decimal,
}

/// One point on a request's as-of axis.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PricingDateAndMarketDataAsOf {
    /// Pricing date
    pub pricing_date: NaiveDate,
    /// Market for that date
    pub market: Market,
}

/// A batched request sent to a provider.
///
/// Every position is priced for every measure at every as-of point.
#[derive(Debug, Clone)]
pub struct RiskRequest {
    /// Instruments with quantities
    pub positions: Vec<RiskPosition>,
    /// Measures, sorted
    pub measures: Vec<RiskMeasure>,
    /// Shared parameters
    pub parameters: RiskRequestParameters,
    /// Shared scenario
    pub scenario: Option<MarketDataScenario>,
    /// As-of axis, sorted by (date, market)
    pub pricing_and_market_data_as_of: Vec<PricingDateAndMarketDataAsOf>,
    /// False in batch mode: the provider returns a ticket instead of results
    pub wait_for_results: bool,
    /// Whether the request contents may be inspected by the provider's staff
    pub request_visible: bool,
}

impl RiskRequest {
    /// Every (risk key, instrument) pair this request covers.
    pub fn risk_keys<'a>(
        &'a self,
        provider: &'a ProviderId,
    ) -> impl Iterator<Item = ResultKey> + 'a {
        self.pricing_and_market_data_as_of.iter().flat_map(move |as_of| {
            self.measures.iter().flat_map(move |measure| {
                let key = RiskKey {
                    provider: provider.clone(),
                    date: as_of.pricing_date,
                    market: as_of.market.clone(),
                    params: self.parameters.clone(),
                    scenario: self.scenario.clone(),
                    risk_measure: measure.clone(),
                };
                self.positions
                    .iter()
                    .map(move |p| (key.clone(), p.instrument.clone()))
            })
        })
    }

    /// Number of individual calculations the request covers.
    pub fn size(&self) -> usize {
        self.positions.len() * self.measures.len() * self.pricing_and_market_data_as_of.len()
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// Per-calculation error returned inside an otherwise successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorValue {
    /// Provider's error message
    pub message: String,
}

impl ErrorValue {
    /// Create an error value.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Value computed for one (risk key, instrument) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RiskValue {
    /// Scalar result
    Float(f64),
    /// Text result
    Text(String),
    /// Tabular result (bucketed risk)
    Table {
        /// Column names
        columns: Vec<String>,
        /// Row values
        rows: Vec<Vec<f64>>,
    },
    /// Calculation failed for this pair
    Error(ErrorValue),
}

impl RiskValue {
    /// Returns true for error values, which are never cached.
    pub fn is_error(&self) -> bool {
        matches!(self, RiskValue::Error(_))
    }

    /// Scalar value, if this is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RiskValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for RiskValue {
    fn from(v: f64) -> Self {
        RiskValue::Float(v)
    }
}

/// Key of a single result: the risk key and the instrument.
pub type ResultKey = (RiskKey, PriceableHandle);

/// Results returned by a provider for one request.
pub type ResultMap = HashMap<ResultKey, RiskValue>;
