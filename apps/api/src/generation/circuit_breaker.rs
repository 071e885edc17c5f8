//! Circuit breaker guarding the text-generation provider.
//!
//! # States
//!
//! - **Closed**: calls proceed normally
//! - **Open**: calls fail fast until the cooldown since the last failure elapses
//! - **HalfOpen**: one trial call is let through to test recovery
//!
//! `try_acquire` hands out a `CallPermit`. While half-open, the permit for the trial
//! call is the only one issued; dropping it without recording an outcome (a cancelled
//! or abandoned request) frees the slot for the next caller.
//!
//! A success from any state closes the circuit and clears the failure count. A failure
//! while half-open re-opens it and restarts the cooldown.
//!
//! One instance is shared by every request in the process (held in `AppState` behind an
//! `Arc`). The read-modify-write of each transition happens under a single mutex, so
//! concurrent outcomes never interleave inside a transition. Ordering *between* concurrent
//! calls is not guaranteed: a success from one request may reset the count just before
//! another request records its failure. The breaker is coarse load shedding, so that
//! eventual consistency is accepted.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed calls before the circuit opens.
    pub failure_threshold: u32,
    /// Time after the last failure before a trial call is allowed.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitPhase {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Point-in-time view of the breaker, for health reporting and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub phase: CircuitPhase,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<Instant>,
}

#[derive(Debug)]
struct BreakerState {
    phase: CircuitPhase,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    /// Id of the half-open trial currently in flight.
    trial: Option<u64>,
    next_trial: u64,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState {
                phase: CircuitPhase::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                trial: None,
                next_trial: 0,
            }),
        }
    }

    /// Current phase. An open circuit whose cooldown has elapsed reports `HalfOpen`.
    #[cfg(test)]
    pub fn phase(&self) -> CircuitPhase {
        self.snapshot().phase
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let mut state = self.state.lock();
        self.promote_if_cooled(&mut state, Instant::now());
        CircuitSnapshot {
            phase: state.phase,
            consecutive_failures: state.consecutive_failures,
            last_failure_at: state.last_failure_at,
        }
    }

    /// Returns a permit when a provider call may proceed now, `None` while the circuit
    /// is open or a half-open trial is already in flight.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let mut state = self.state.lock();
        self.promote_if_cooled(&mut state, Instant::now());

        match state.phase {
            CircuitPhase::Closed => Some(CallPermit {
                breaker: self,
                trial: None,
            }),
            CircuitPhase::Open => None,
            CircuitPhase::HalfOpen if state.trial.is_some() => None,
            CircuitPhase::HalfOpen => {
                let id = state.next_trial;
                state.next_trial = state.next_trial.wrapping_add(1);
                state.trial = Some(id);
                Some(CallPermit {
                    breaker: self,
                    trial: Some(id),
                })
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if state.phase != CircuitPhase::Closed {
            info!(
                "Circuit breaker closed after {} consecutive failures",
                state.consecutive_failures
            );
        }
        state.phase = CircuitPhase::Closed;
        state.consecutive_failures = 0;
        state.trial = None;
    }

    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.promote_if_cooled(&mut state, now);

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure_at = Some(now);
        state.trial = None;

        match state.phase {
            CircuitPhase::HalfOpen => {
                warn!("Circuit breaker trial call failed, re-opening");
                state.phase = CircuitPhase::Open;
            }
            CircuitPhase::Closed if state.consecutive_failures >= self.config.failure_threshold => {
                warn!(
                    "Circuit breaker opened after {} consecutive failures (cooldown {:?})",
                    state.consecutive_failures, self.config.cooldown
                );
                state.phase = CircuitPhase::Open;
            }
            _ => {}
        }
    }

    fn promote_if_cooled(&self, state: &mut BreakerState, now: Instant) {
        if state.phase != CircuitPhase::Open {
            return;
        }
        let cooled = state
            .last_failure_at
            .map_or(true, |at| now.duration_since(at) >= self.config.cooldown);
        if cooled {
            state.phase = CircuitPhase::HalfOpen;
            state.trial = None;
        }
    }

    fn release_trial(&self, id: u64) {
        let mut state = self.state.lock();
        if state.trial == Some(id) {
            warn!("Circuit breaker trial call ended without an outcome, releasing the slot");
            state.trial = None;
        }
    }
}

/// Admission to call the provider. Hold it until the outcome is recorded.
#[must_use = "dropping the permit releases a half-open trial slot"]
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: Option<u64>,
}

impl CallPermit<'_> {
    pub fn is_trial(&self) -> bool {
        self.trial.is_some()
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.trial {
            self.breaker.release_trial(id);
        }
    }
}
