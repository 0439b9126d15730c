//! Identifier types used across the coordinator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Remote provider identifier.
///
/// Requests are grouped per provider, and each provider receives its own
/// batch of outbound requests.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId(pub String);

impl ProviderId {
    /// Create a new provider ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProviderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

static NEXT_PRICEABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity token for a priceable instrument.
///
/// Tokens are process-unique and never reused, so a cache entry can never be
/// attributed to a different instrument after the original is released.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct PriceableId(u64);

impl PriceableId {
    /// Allocate a fresh token.
    pub fn next() -> Self {
        Self(NEXT_PRICEABLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw token value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PriceableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ticket returned by a provider for a request submitted in batch mode.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestTicket(pub String);

impl RequestTicket {
    /// Create a new ticket.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ticket as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RequestTicket {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
