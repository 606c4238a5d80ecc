//! Circuit breaker for downstream protection.
//!
//! # States
//! - Closed: normal operation, records are forwarded
//! - Open: downstream assumed down, attempts are refused without touching it
//! - Half-Open: a single trial attempt tests whether it recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: throughput >= minimum_throughput and
//!                failure ratio >= failure_ratio within the sampling window
//! Open → Half-Open: first permission check after break_duration
//! Half-Open → Closed: trial succeeds (window is cleared)
//! Half-Open → Open: trial fails (break_duration starts over)
//! ```
//!
//! # Design Decisions
//! - Callers bracket the guarded call with `permit()` / `report_outcome()`
//! - All state sits behind one mutex, so a breaker shared by several
//!   workers still admits exactly one half-open trial
//! - Outcomes that arrive while Open, or while Half-Open without an
//!   outstanding trial, started in an earlier state and are ignored

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::broadcast;

use crate::observability::metrics;
use crate::resilience::clock::{Clock, SystemClock};
use crate::resilience::window::{FailureWindow, Outcome};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State transition notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakerEvent {
    Opened { cause: String, break_duration: Duration },
    HalfOpened,
    Closed,
}

/// Invalid breaker settings.
#[derive(Debug, Error, PartialEq)]
pub enum BreakerConfigError {
    #[error("failure_ratio must be in (0, 1], got {0}")]
    FailureRatio(f64),
    #[error("minimum_throughput must be at least 1")]
    MinimumThroughput,
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failure ratio at or above which the circuit opens.
    pub failure_ratio: f64,
    /// Trailing window over which the ratio is computed.
    pub sampling_duration: Duration,
    /// Outcomes required in the window before the ratio is trusted.
    pub minimum_throughput: usize,
    /// How long the circuit stays open before allowing a trial.
    pub break_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_ratio: 0.9,
            sampling_duration: Duration::from_secs(10),
            minimum_throughput: 3,
            break_duration: Duration::from_secs(5),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), BreakerConfigError> {
        if !(self.failure_ratio > 0.0 && self.failure_ratio <= 1.0) {
            return Err(BreakerConfigError::FailureRatio(self.failure_ratio));
        }
        if self.minimum_throughput == 0 {
            return Err(BreakerConfigError::MinimumThroughput);
        }
        if self.sampling_duration.is_zero() {
            return Err(BreakerConfigError::ZeroDuration("sampling_duration"));
        }
        if self.break_duration.is_zero() {
            return Err(BreakerConfigError::ZeroDuration("break_duration"));
        }
        Ok(())
    }
}

/// Point-in-time view for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub throughput: usize,
    pub failure_ratio: f64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    window: FailureWindow,
    last_failure: Option<String>,
}

/// Failure-ratio circuit breaker.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    events: broadcast::Sender<BreakerEvent>,
    clock: C,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.lock().state)
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Result<Self, BreakerConfigError> {
        Self::with_clock(name, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> Result<Self, BreakerConfigError> {
        config.validate()?;
        let (events, _) = broadcast::channel(16);
        let breaker = Self {
            name: name.into(),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                opened_at: None,
                trial_in_flight: false,
                window: FailureWindow::new(config.sampling_duration),
                last_failure: None,
            }),
            config,
            events,
            clock,
        };
        metrics::record_breaker_state(&breaker.name, CircuitState::Closed);
        Ok(breaker)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<BreakerEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move Open → HalfOpen once the break has elapsed.
    fn check_break_elapsed(&self, inner: &mut BreakerInner, now: Instant) -> Option<BreakerEvent> {
        if inner.state != CircuitState::Open {
            return None;
        }
        let opened_at = inner.opened_at?;
        if now.saturating_duration_since(opened_at) < self.config.break_duration {
            return None;
        }
        inner.state = CircuitState::HalfOpen;
        inner.trial_in_flight = false;
        Some(BreakerEvent::HalfOpened)
    }

    /// Ask whether an attempt may be made now.
    ///
    /// A `true` in Half-Open reserves the single trial; the caller must
    /// follow up with [`report_outcome`](Self::report_outcome).
    pub fn permit(&self) -> bool {
        let now = self.clock.now();
        let (granted, event) = {
            let mut inner = self.lock();
            let event = self.check_break_elapsed(&mut inner, now);
            let granted = match inner.state {
                CircuitState::Closed => true,
                CircuitState::Open => false,
                CircuitState::HalfOpen if inner.trial_in_flight => false,
                CircuitState::HalfOpen => {
                    inner.trial_in_flight = true;
                    true
                }
            };
            (granted, event)
        };

        if let Some(event) = event {
            self.emit(event);
        }
        granted
    }

    /// Feed the outcome of a permitted attempt.
    pub fn report_outcome(&self, outcome: Outcome) {
        let now = self.clock.now();
        let event = {
            let mut inner = self.lock();
            match inner.state {
                CircuitState::Closed => {
                    if let Outcome::Failure(cause) = &outcome {
                        inner.last_failure = Some(cause.clone());
                    }
                    inner.window.record(&outcome, now);
                    let throughput = inner.window.throughput(now);
                    let ratio = inner.window.ratio(now);
                    if throughput >= self.config.minimum_throughput && ratio >= self.config.failure_ratio {
                        inner.state = CircuitState::Open;
                        inner.opened_at = Some(now);
                        let cause = inner
                            .last_failure
                            .clone()
                            .unwrap_or_else(|| "failure ratio exceeded".to_string());
                        Some(BreakerEvent::Opened {
                            cause,
                            break_duration: self.config.break_duration,
                        })
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen if inner.trial_in_flight => {
                    inner.trial_in_flight = false;
                    match outcome {
                        Outcome::Success => {
                            inner.state = CircuitState::Closed;
                            inner.opened_at = None;
                            inner.last_failure = None;
                            inner.window.clear();
                            Some(BreakerEvent::Closed)
                        }
                        Outcome::Failure(cause) => {
                            inner.state = CircuitState::Open;
                            inner.opened_at = Some(now);
                            inner.last_failure = Some(cause.clone());
                            Some(BreakerEvent::Opened {
                                cause,
                                break_duration: self.config.break_duration,
                            })
                        }
                    }
                }
                state => {
                    tracing::debug!(breaker = %self.name, state = %state, "Ignoring stale outcome");
                    None
                }
            }
        };

        if let Some(event) = event {
            self.emit(event);
        }
    }

    /// Current state, applying the Open → Half-Open timer first.
    pub fn state(&self) -> CircuitState {
        let now = self.clock.now();
        let (state, event) = {
            let mut inner = self.lock();
            let event = self.check_break_elapsed(&mut inner, now);
            (inner.state, event)
        };
        if let Some(event) = event {
            self.emit(event);
        }
        state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = self.clock.now();
        let mut inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            throughput: inner.window.throughput(now),
            failure_ratio: inner.window.ratio(now),
        }
    }

    fn emit(&self, event: BreakerEvent) {
        let state = match &event {
            BreakerEvent::Opened { cause, break_duration } => {
                tracing::warn!(
                    breaker = %self.name,
                    cause = %cause,
                    break_duration_ms = break_duration.as_millis() as u64,
                    "Circuit opened, forwarding halted"
                );
                CircuitState::Open
            }
            BreakerEvent::HalfOpened => {
                tracing::info!(breaker = %self.name, "Circuit half-open, allowing one trial");
                CircuitState::HalfOpen
            }
            BreakerEvent::Closed => {
                tracing::info!(breaker = %self.name, "Circuit closed, forwarding resumed");
                CircuitState::Closed
            }
        };
        metrics::record_breaker_state(&self.name, state);
        metrics::record_breaker_transition(&self.name, state);
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
