//! Sliding-time-window failure accounting.
//!
//! # Design Decisions
//! - One entry per outcome; the window covers `(now - sampling_duration, now]`
//! - Stale entries are evicted before every read, so a ratio never reflects
//!   outcomes older than the sampling duration
//! - An empty window reports a ratio of 0

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Result of one forwarding attempt, as seen by the breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(String),
}

impl Outcome {
    pub fn failure(cause: impl Into<String>) -> Self {
        Outcome::Failure(cause.into())
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }
}

#[derive(Debug)]
pub struct FailureWindow {
    sampling_duration: Duration,
    /// (recorded at, was failure), oldest first.
    samples: VecDeque<(Instant, bool)>,
    failures: usize,
}

impl FailureWindow {
    pub fn new(sampling_duration: Duration) -> Self {
        Self {
            sampling_duration,
            samples: VecDeque::new(),
            failures: 0,
        }
    }

    pub fn record(&mut self, outcome: &Outcome, now: Instant) {
        let failed = outcome.is_failure();
        if failed {
            self.failures += 1;
        }
        self.samples.push_back((now, failed));
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(at, failed)) = self.samples.front() {
            if now.saturating_duration_since(at) < self.sampling_duration {
                break;
            }
            self.samples.pop_front();
            if failed {
                self.failures -= 1;
            }
        }
    }

    /// Failures divided by total outcomes inside the window.
    pub fn ratio(&mut self, now: Instant) -> f64 {
        self.evict(now);
        if self.samples.is_empty() {
            return 0.0;
        }
        self.failures as f64 / self.samples.len() as f64
    }

    /// Number of outcomes inside the window.
    pub fn throughput(&mut self, now: Instant) -> usize {
        self.evict(now);
        self.samples.len()
    }

    pub fn failures(&mut self, now: Instant) -> usize {
        self.evict(now);
        self.failures
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.failures = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
