//! Circuit breaker for instance protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: instance excluded from selection
//! - Half-Open: instance selectable again, next forward decides
//!
//! # State Transitions
//! ```text
//! Closed → Open:       consecutive forwarding failures >= threshold
//! Open → Half-Open:    health prober reports the instance recovered
//!                      (or open_duration elapsed, when probing is disabled)
//! Half-Open → Closed:  one forwarding success
//! Half-Open → Open:    one forwarding failure
//! ```
//!
//! # Design Decisions
//! - Per-instance circuit breaker (not global)
//! - Recovery is probe-gated; elapsed time leaves Open only for breakers
//!   built with timed recovery, used when active probing is off
//! - Each transition is decided under the breaker's own mutex, so concurrent
//!   failures cannot fire "opened" twice

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use crate::clock::unix_millis;
use crate::config::CircuitBreakerConfig;
use crate::health::{HealthEvent, HealthObserver, Transition};
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// A state change produced by one breaker call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerTransition {
    Opened,
    HalfOpened,
    Closed,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<u64>,
}

/// Read-only copy of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub opened_at: Option<u64>,
    pub failure_threshold: u32,
    pub open_duration_secs: u64,
    /// How long the breaker has been open, if it is.
    pub open_for_ms: Option<u64>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    open_duration: Duration,
    timed_recovery: bool,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
            failure_threshold: failure_threshold.max(1),
            open_duration,
            timed_recovery: false,
        }
    }

    /// Go half-open once `open_duration` has elapsed instead of waiting for a probe.
    pub fn with_timed_recovery(mut self) -> Self {
        self.timed_recovery = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if self.timed_recovery && inner.state == BreakerState::Open {
            let open_for = inner.opened_at.map_or(0, |at| unix_millis().saturating_sub(at));
            if open_for >= self.open_duration.as_millis() as u64 {
                inner.state = BreakerState::HalfOpen;
                inner.consecutive_failures = 0;
            }
        }
        inner
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// False only while open.
    pub fn allows_traffic(&self) -> bool {
        self.state() != BreakerState::Open
    }

    pub fn record_failure(&self) -> Option<BreakerTransition> {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        match inner.state {
            BreakerState::Closed if inner.consecutive_failures >= self.failure_threshold => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(unix_millis());
                Some(BreakerTransition::Opened)
            }
            BreakerState::HalfOpen => {
                // Keep `open ⇒ failures >= threshold` true after a half-open relapse.
                inner.consecutive_failures = inner.consecutive_failures.max(self.failure_threshold);
                inner.state = BreakerState::Open;
                inner.opened_at = Some(unix_millis());
                Some(BreakerTransition::Opened)
            }
            _ => None,
        }
    }

    pub fn record_success(&self) -> Option<BreakerTransition> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
                None
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                Some(BreakerTransition::Closed)
            }
            // A request dispatched before the breaker opened; recovery stays probe-gated.
            BreakerState::Open => None,
        }
    }

    /// The instance passed a health probe after being unhealthy.
    pub fn on_recovered(&self) -> Option<BreakerTransition> {
        let mut inner = self.lock();
        if inner.state != BreakerState::Open {
            return None;
        }
        inner.state = BreakerState::HalfOpen;
        inner.consecutive_failures = 0;
        Some(BreakerTransition::HalfOpened)
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            opened_at: inner.opened_at,
            failure_threshold: self.failure_threshold,
            open_duration_secs: self.open_duration.as_secs(),
            open_for_ms: match inner.state {
                BreakerState::Open => inner.opened_at.map(|at| unix_millis().saturating_sub(at)),
                _ => None,
            },
        }
    }
}

/// Breakers for every instance that has seen traffic, keyed by instance id.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
    timed_recovery: bool,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
            timed_recovery: false,
        }
    }

    /// Breakers created from now on recover on elapsed time.
    pub fn with_timed_recovery(mut self) -> Self {
        self.timed_recovery = true;
        self
    }

    pub fn breaker(&self, id: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(id) {
            return existing.clone();
        }
        self.breakers
            .entry(id.to_string())
            .or_insert_with(|| {
                let breaker = CircuitBreaker::new(
                    self.config.failure_threshold,
                    Duration::from_secs(self.config.open_duration_secs),
                );
                Arc::new(if self.timed_recovery {
                    breaker.with_timed_recovery()
                } else {
                    breaker
                })
            })
            .clone()
    }

    /// Closed for instances without a breaker yet.
    pub fn state(&self, id: &str) -> BreakerState {
        self.breakers
            .get(id)
            .map(|b| b.state())
            .unwrap_or(BreakerState::Closed)
    }

    pub fn allows_traffic(&self, id: &str) -> bool {
        self.state(id) != BreakerState::Open
    }

    pub fn record_failure(&self, id: &str) -> Option<BreakerTransition> {
        let transition = self.breaker(id).record_failure();
        if transition == Some(BreakerTransition::Opened) {
            tracing::warn!(instance = %id, "Circuit breaker opened");
            metrics::record_breaker_open(id, true);
        }
        transition
    }

    pub fn record_success(&self, id: &str) -> Option<BreakerTransition> {
        let breaker = self.breakers.get(id).map(|b| b.clone())?;
        let transition = breaker.record_success();
        if transition == Some(BreakerTransition::Closed) {
            tracing::info!(instance = %id, "Circuit breaker closed");
            metrics::record_breaker_open(id, false);
        }
        transition
    }

    pub fn snapshot(&self, id: &str) -> Option<BreakerSnapshot> {
        self.breakers.get(id).map(|b| b.snapshot())
    }

    /// All breakers, sorted by instance id.
    pub fn snapshots(&self) -> Vec<(String, BreakerSnapshot)> {
        let mut all: Vec<_> = self
            .breakers
            .iter()
            .map(|b| (b.key().clone(), b.value().snapshot()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn forget(&self, ids: &[String]) {
        for id in ids {
            self.breakers.remove(id);
        }
    }
}

impl HealthObserver for BreakerRegistry {
    fn on_health_event(&self, event: &HealthEvent) {
        if event.transition != Transition::Recovered {
            return;
        }
        let Some(breaker) = self.breakers.get(&event.instance_id).map(|b| b.clone()) else {
            return;
        };
        if breaker.on_recovered() == Some(BreakerTransition::HalfOpened) {
            tracing::info!(instance = %event.instance_id, "Circuit breaker half-open after recovery");
            metrics::record_breaker_open(&event.instance_id, false);
        }
    }
}
