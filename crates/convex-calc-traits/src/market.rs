//! Market snapshots and pricing locations.
//!
//! A [`Market`] tells the provider which market data to price against. Close
//! markets are reproducible end-of-day snapshots; live markets stream and are
//! never cached.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Location whose close is used to source market data.
#[derive(
    Debug, Clone, Copy, Default, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum PricingLocation {
    /// New York
    NYC,
    /// London
    #[default]
    LDN,
    /// Hong Kong
    HKG,
    /// Tokyo
    TKO,
}

impl fmt::Display for PricingLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PricingLocation::NYC => "NYC",
            PricingLocation::LDN => "LDN",
            PricingLocation::HKG => "HKG",
            PricingLocation::TKO => "TKO",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for PricingLocation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NYC" => Ok(PricingLocation::NYC),
            "LDN" => Ok(PricingLocation::LDN),
            "HKG" => Ok(PricingLocation::HKG),
            "TKO" => Ok(PricingLocation::TKO),
            other => Err(ConfigError::InvalidLocation(other.to_string())),
        }
    }
}

/// Market data a calculation is priced against.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Market {
    /// Close-of-day snapshot. Reproducible, so results may be cached.
    Close {
        /// Location whose close is used (provider default when absent)
        location: Option<PricingLocation>,
        /// Snapshot date (the pricing date when absent)
        as_of: Option<NaiveDate>,
    },

    /// Streaming market. Results are not reproducible and are never cached.
    Live {
        /// Location of the live feed
        location: Option<PricingLocation>,
    },
}

impl Market {
    /// Close market at the given location.
    pub fn close(location: Option<PricingLocation>) -> Self {
        Market::Close {
            location,
            as_of: None,
        }
    }

    /// Close market for an explicit snapshot date.
    pub fn close_as_of(location: Option<PricingLocation>, as_of: NaiveDate) -> Self {
        Market::Close {
            location,
            as_of: Some(as_of),
        }
    }

    /// Live market at the given location.
    pub fn live(location: Option<PricingLocation>) -> Self {
        Market::Live { location }
    }

    /// Returns true for streaming, non-reproducible markets.
    pub fn is_live(&self) -> bool {
        matches!(self, Market::Live { .. })
    }

    /// Market data location, if one is set.
    pub fn location(&self) -> Option<PricingLocation> {
        match self {
            Market::Close { location, .. } | Market::Live { location } => *location,
        }
    }
}

impl Default for Market {
    fn default() -> Self {
        Market::close(None)
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loc = self
            .location()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "-".to_string());
        match self {
            Market::Close {
                as_of: Some(date), ..
            } => write!(f, "Close({} @ {})", loc, date),
            Market::Close { .. } => write!(f, "Close({})", loc),
            Market::Live { .. } => write!(f, "Live({})", loc),
        }
    }
}
