//! Failure classification.
//!
//! Only errors whose kind is in the handled set count against the breaker.
//! Anything else (a malformed or oversized record, say) is still reported
//! to the caller but enters the window as a non-failure, since the
//! downstream answered and is evidently reachable.

use std::collections::HashSet;

use crate::resilience::window::Outcome;
use crate::transport::{Ack, ErrorKind, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailurePolicy {
    handled: HashSet<ErrorKind>,
}

impl FailurePolicy {
    pub fn new(handled: impl IntoIterator<Item = ErrorKind>) -> Self {
        Self {
            handled: handled.into_iter().collect(),
        }
    }

    /// Whether `err` should count as a breaker failure.
    pub fn handles(&self, err: &TransportError) -> bool {
        self.handled.contains(&err.kind)
    }

    pub fn outcome_of(&self, result: &Result<Ack, TransportError>) -> Outcome {
        match result {
            Err(err) if self.handles(err) => Outcome::Failure(err.to_string()),
            _ => Outcome::Success,
        }
    }
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::new([ErrorKind::Network, ErrorKind::Timeout])
    }
}
