//! Fault injection framework for simulated links.
//!
//! Enables configurable transport failures for resilience testing.
//! Injected faults surface as `CommandError::Link`, the same transient
//! error class a real transport produces, so task aggregation behavior
//! can be exercised end to end.

use crate::rng::SimRng;
use conductor_core::{CmdResult, CommandError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Which side of the link an access touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Put,
    Get,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Put => f.write_str("put"),
            Access::Get => f.write_str("get"),
        }
    }
}

/// Specific failure scenarios
#[derive(Debug, Clone)]
pub enum FaultScenario {
    /// Every put to the named field fails
    PutFailure { field: &'static str },
    /// Every get of the named field fails
    GetFailure { field: &'static str },
    /// Puts to the named field fail after N successful ones
    PutFailAfter { field: &'static str, count: u32 },
}

#[derive(Default, Debug)]
struct FaultState {
    /// Per-field put counters for PutFailAfter scenarios
    put_counts: HashMap<&'static str, u32>,
}

/// Fault injection configuration for simulated links
#[derive(Clone, Debug)]
pub struct FaultConfig {
    /// Per-field failure rate (0.0 to 1.0); `"*"` matches any field
    rates: Arc<HashMap<&'static str, f64>>,
    /// Specific failure scenarios
    scenarios: Arc<Vec<FaultScenario>>,
    /// RNG for failure decisions
    rng: Arc<SimRng>,
    /// State tracking for scenarios
    state: Arc<Mutex<FaultState>>,
}

impl FaultConfig {
    /// No faults (default)
    pub fn none() -> Self {
        Self {
            rates: Arc::new(HashMap::new()),
            scenarios: Arc::new(Vec::new()),
            rng: Arc::new(SimRng::new(None)),
            state: Arc::new(Mutex::new(FaultState::default())),
        }
    }

    /// Uniform random failures on every access, with a specific seed
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("*", rate);
        Self {
            rates: Arc::new(rates),
            scenarios: Arc::new(Vec::new()),
            rng: Arc::new(SimRng::new(seed)),
            state: Arc::new(Mutex::new(FaultState::default())),
        }
    }

    /// A single scenario
    pub fn scenario(scenario: FaultScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Multiple scenarios
    pub fn scenarios(scenarios: Vec<FaultScenario>) -> Self {
        Self {
            rates: Arc::new(HashMap::new()),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(SimRng::new(None)),
            state: Arc::new(Mutex::new(FaultState::default())),
        }
    }

    /// Check whether an access should fail and return the injected error
    pub fn check(&self, link: &str, access: Access, field: &str) -> CmdResult<()> {
        let mut state = self.state.lock();

        for scenario in self.scenarios.iter() {
            match scenario {
                FaultScenario::PutFailure { field: f } if access == Access::Put && *f == field => {
                    return Err(CommandError::link(
                        link,
                        format!("injected put failure on '{}'", field),
                    ));
                }
                FaultScenario::GetFailure { field: f } if access == Access::Get && *f == field => {
                    return Err(CommandError::link(
                        link,
                        format!("injected get failure on '{}'", field),
                    ));
                }
                FaultScenario::PutFailAfter { field: f, count }
                    if access == Access::Put && *f == field =>
                {
                    let current = state.put_counts.entry(*f).or_insert(0);
                    *current += 1;
                    if *current > *count {
                        return Err(CommandError::link(
                            link,
                            format!("injected put failure after {} operations", count),
                        ));
                    }
                }
                _ => {}
            }
        }

        let rate = self
            .rates
            .get(field)
            .or_else(|| self.rates.get("*"))
            .copied()
            .unwrap_or(0.0);

        if self.rng.should_fail(rate) {
            return Err(CommandError::link(
                link,
                format!("random {} failure on '{}'", access, field),
            ));
        }

        Ok(())
    }

    /// Reset scenario state (clear counters)
    pub fn reset(&self) {
        *self.state.lock() = FaultState::default();
    }
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self::none()
    }
}
