//! Scenarios and the per-thread scenario stack.
//!
//! Scenarios are entered with [`Scenario::enter`] and stack per thread. A
//! context snapshots the stack when it is built and turns it into a single
//! [`MarketDataScenario`] descriptor.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::marker::PhantomData;

thread_local! {
    static SCENARIO_PATH: RefCell<Vec<Scenario>> = const { RefCell::new(Vec::new()) };
}

/// A named market data scenario (shock, override, historical replay...).
///
/// The coordinator treats scenarios as opaque: only equality, hashing and
/// ordering matter.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name
    pub name: String,
    /// Scenario parameters, in key order
    pub parameters: BTreeMap<String, String>,
}

impl Scenario {
    /// Create a scenario with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Add a parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Push this scenario onto the current thread's scenario stack.
    ///
    /// The scenario is popped when the returned scope is dropped.
    pub fn enter(&self) -> ScenarioScope {
        SCENARIO_PATH.with(|path| path.borrow_mut().push(self.clone()));
        ScenarioScope {
            _not_send: PhantomData,
        }
    }

    /// Scenarios entered on the current thread, outermost first.
    pub fn path() -> Vec<Scenario> {
        SCENARIO_PATH.with(|path| path.borrow().clone())
    }
}

/// Guard returned by [`Scenario::enter`].
///
/// Not `Send`: the scenario stack is per thread.
#[must_use = "the scenario is exited as soon as the scope is dropped"]
pub struct ScenarioScope {
    _not_send: PhantomData<*const ()>,
}

impl Drop for ScenarioScope {
    fn drop(&mut self) {
        SCENARIO_PATH.with(|path| {
            path.borrow_mut().pop();
        });
    }
}

/// Scenario descriptor attached to a risk key and an outbound request.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarketDataScenario {
    /// Exactly one scenario was active
    Single(Scenario),
    /// Several nested scenarios, innermost first
    Composite(Vec<Scenario>),
}

impl MarketDataScenario {
    /// Derive the descriptor from a scenario path (outermost first).
    ///
    /// An empty path gives `None`, one entry gives `Single`, and several give
    /// `Composite` in reverse order so the innermost scenario applies first.
    pub fn from_path(path: &[Scenario]) -> Option<Self> {
        match path {
            [] => None,
            [single] => Some(MarketDataScenario::Single(single.clone())),
            many => Some(MarketDataScenario::Composite(
                many.iter().rev().cloned().collect(),
            )),
        }
    }

    /// Descriptor for the scenarios entered on the current thread.
    pub fn current() -> Option<Self> {
        Self::from_path(&Scenario::path())
    }
}
