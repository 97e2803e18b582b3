// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-dependency circuit breakers.
//!
//! Each dependency gets its own breaker; breakers are never shared across
//! dependencies. All transitions happen under a single mutex per breaker,
//! so concurrent admissions and outcome reports from many saga tasks
//! cannot overrun the half-open trial budget. Admission hands out a
//! [`CallPermit`]; a permit dropped without an outcome (the call future
//! was cancelled) releases its trial slot, so an aborted probe cannot
//! wedge the breaker half-open.
//!
//! Breaker mutexes propagate poisoning as a panic: a breaker that
//! panicked mid-transition has unknown state and must not keep making
//! admission decisions.
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure count >= threshold within the rolling window
//! Open → Half-Open: first admission after the cool-down elapses (one trial)
//! Half-Open → Closed: configured number of consecutive trial successes
//! Half-Open → Open: any trial failure (cool-down timer resets)
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::BreakerConfig;

/// Stable key identifying a downstream dependency.
///
/// Selects the breaker instance; one breaker per dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyId(String);

impl DependencyId {
    /// Create a dependency identity from a logical service name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The logical service name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DependencyId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for DependencyId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, calls pass through.
    Closed,
    /// Dependency assumed down, calls fail fast.
    Open,
    /// Probing recovery with a bounded number of trial calls.
    HalfOpen,
}

impl CircuitState {
    /// Returns the string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    /// Parse a state from a string. Unknown strings default to closed.
    pub fn parse(s: &str) -> Self {
        match s {
            "open" => Self::Open,
            "half_open" => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    /// Timestamps of recent failures, pruned to the rolling window.
    failures: VecDeque<Instant>,
    /// When the breaker last transitioned to open.
    opened_at: Option<Instant>,
    /// Trial calls currently in flight while half-open.
    trials_in_flight: u32,
    /// Consecutive trial successes while half-open.
    trial_successes: u32,
    /// Incremented on every transition into half-open, so a stale permit
    /// from an earlier probe round cannot free a newer trial's slot.
    trial_epoch: u64,
}

/// Circuit breaker for a single dependency.
///
/// Decides whether a call may proceed and is fed success/failure signals
/// by the call executor.
pub struct CircuitBreaker {
    dependency: DependencyId,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("dependency", &self.dependency)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a closed breaker for `dependency`.
    pub fn new(dependency: DependencyId, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            dependency,
            config,
            clock,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                trials_in_flight: 0,
                trial_successes: 0,
                trial_epoch: 0,
            }),
        }
    }

    /// The dependency this breaker protects.
    pub fn dependency(&self) -> &DependencyId {
        &self.dependency
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Try to admit a call, returning a permit when allowed.
    ///
    /// Admission succeeds iff the breaker is closed, or half-open with
    /// spare trial budget, or open with the cool-down elapsed. In the
    /// last case the breaker atomically transitions to half-open and the
    /// caller holds the first trial slot.
    ///
    /// The permit must be resolved through [`CallPermit::record_success`]
    /// or [`CallPermit::record_failure`]. A permit dropped unresolved
    /// (the call future was cancelled before its outcome) releases its
    /// trial slot without counting an outcome.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => Some(CallPermit {
                breaker: self,
                trial_epoch: None,
                outcome_recorded: false,
            }),
            CircuitState::Open => {
                let cooled_down = match inner.opened_at {
                    Some(opened_at) => now.duration_since(opened_at) >= self.config.cool_down,
                    None => true,
                };
                if !cooled_down {
                    return None;
                }
                inner.state = CircuitState::HalfOpen;
                inner.trials_in_flight = 1;
                inner.trial_successes = 0;
                inner.trial_epoch += 1;
                info!(
                    dependency = %self.dependency,
                    "Cool-down elapsed, breaker half-open, admitting trial call"
                );
                Some(CallPermit {
                    breaker: self,
                    trial_epoch: Some(inner.trial_epoch),
                    outcome_recorded: false,
                })
            }
            CircuitState::HalfOpen => {
                if inner.trials_in_flight < self.config.half_open_max_trials {
                    inner.trials_in_flight += 1;
                    Some(CallPermit {
                        breaker: self,
                        trial_epoch: Some(inner.trial_epoch),
                        outcome_recorded: false,
                    })
                } else {
                    debug!(
                        dependency = %self.dependency,
                        in_flight = inner.trials_in_flight,
                        "Trial budget exhausted, denying call"
                    );
                    None
                }
            }
        }
    }

    /// Record a successful call outcome.
    pub fn record_success(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                Self::prune_window(&mut inner.failures, now, &self.config);
            }
            CircuitState::HalfOpen => {
                inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
                inner.trial_successes += 1;
                debug!(
                    dependency = %self.dependency,
                    successes = inner.trial_successes,
                    "Trial call succeeded"
                );
                if inner.trial_successes >= self.config.half_open_success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failures.clear();
                    inner.opened_at = None;
                    inner.trials_in_flight = 0;
                    inner.trial_successes = 0;
                    info!(dependency = %self.dependency, "Breaker closed, dependency recovered");
                }
            }
            // A call admitted before the breaker re-opened may report late.
            CircuitState::Open => {}
        }
    }

    /// Record a failed call outcome.
    ///
    /// Only failures that reflect dependency health should be recorded
    /// here; the call executor filters out caller-side errors.
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.failures.push_back(now);
                Self::prune_window(&mut inner.failures, now, &self.config);
                if inner.failures.len() as u32 >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    inner.failures.clear();
                    warn!(
                        dependency = %self.dependency,
                        threshold = self.config.failure_threshold,
                        "Failure threshold exceeded, breaker open"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.trials_in_flight = 0;
                inner.trial_successes = 0;
                warn!(
                    dependency = %self.dependency,
                    "Trial call failed, breaker re-open with reset cool-down"
                );
            }
            CircuitState::Open => {}
        }
    }

    fn prune_window(failures: &mut VecDeque<Instant>, now: Instant, config: &BreakerConfig) {
        while let Some(oldest) = failures.front() {
            if now.duration_since(*oldest) > config.failure_window {
                failures.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Admission token for one call through a breaker.
///
/// Held across the transport await so a cancelled call cannot leak its
/// half-open trial slot: dropping the permit without recording an outcome
/// releases the slot (the call is no evidence either way).
#[must_use = "a permit must be resolved or dropped with the call it admits"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    /// Set when admitted as a half-open trial; names the probe round.
    trial_epoch: Option<u64>,
    outcome_recorded: bool,
}

impl CallPermit<'_> {
    /// Resolve the admitted call as a success.
    pub fn record_success(mut self) {
        self.outcome_recorded = true;
        self.breaker.record_success();
    }

    /// Resolve the admitted call as a failure.
    pub fn record_failure(mut self) {
        self.outcome_recorded = true;
        self.breaker.record_failure();
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.outcome_recorded {
            return;
        }
        let Some(epoch) = self.trial_epoch else {
            return;
        };
        // Never panic in drop; a poisoned breaker is already unwinding.
        let Ok(mut inner) = self.breaker.inner.lock() else {
            return;
        };
        if inner.state == CircuitState::HalfOpen && inner.trial_epoch == epoch {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
            debug!(
                dependency = %self.breaker.dependency,
                "Trial call dropped before its outcome, slot released"
            );
        }
    }
}

/// Explicitly owned map from dependency identity to breaker.
///
/// Passed by handle into the call executor rather than living in a
/// process-wide singleton, so it stays testable and swappable.
pub struct BreakerRegistry {
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    breakers: Mutex<HashMap<DependencyId, Arc<CircuitBreaker>>>,
}

impl fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("config", &self.config)
            .field("breakers", &self.breakers.lock().unwrap().len())
            .finish()
    }
}

impl BreakerRegistry {
    /// Create a registry with the given tunables and time source.
    pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Create a registry on the system clock.
    pub fn with_system_clock(config: BreakerConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    /// Get the breaker for `dependency`, creating a closed one on first use.
    pub fn breaker(&self, dependency: &DependencyId) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry(dependency.clone())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    dependency.clone(),
                    self.config.clone(),
                    self.clock.clone(),
                ))
            })
            .clone()
    }

    /// Snapshot of every known breaker's state, for operator queries.
    pub fn states(&self) -> HashMap<DependencyId, CircuitState> {
        self.breakers
            .lock()
            .unwrap()
            .iter()
            .map(|(dep, breaker)| (dep.clone(), breaker.state()))
            .collect()
    }
}
