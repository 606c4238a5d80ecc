//! Relay error taxonomy.
//!
//! None of these stop the loop; they decide what happens to the record
//! at hand.

use thiserror::Error;

use crate::resilience::CircuitState;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Polling the source failed; nothing was read.
    #[error("receive failed: {0}")]
    Receive(#[source] TransportError),

    /// The destination did not take the record.
    #[error("send of offset {offset} failed: {source}")]
    Send {
        offset: i64,
        #[source]
        source: TransportError,
        /// Counted against the breaker; the record is retried.
        breaker_relevant: bool,
    },

    /// The breaker refused the attempt. Expected backpressure, not a fault.
    #[error("circuit {state}, attempt refused")]
    CircuitOpen { state: CircuitState },

    /// The record was delivered but its offset could not be committed.
    #[error("commit of offset {offset} failed: {source}")]
    Commit {
        offset: i64,
        #[source]
        source: TransportError,
    },
}

impl RelayError {
    /// Whether the record involved must be attempted again.
    pub fn retains_record(&self) -> bool {
        matches!(
            self,
            RelayError::CircuitOpen { .. }
                | RelayError::Send {
                    breaker_relevant: true,
                    ..
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retains_record() {
        let open = RelayError::CircuitOpen {
            state: CircuitState::Open,
        };
        assert!(open.retains_record());
        assert_eq!(open.to_string(), "circuit open, attempt refused");

        let network = RelayError::Send {
            offset: 4,
            source: TransportError::network("reset"),
            breaker_relevant: true,
        };
        assert!(network.retains_record());

        let poison = RelayError::Send {
            offset: 4,
            source: TransportError::application("too large"),
            breaker_relevant: false,
        };
        assert!(!poison.retains_record());
        assert_eq!(poison.to_string(), "send of offset 4 failed: application error: too large");

        let commit = RelayError::Commit {
            offset: 4,
            source: TransportError::network("coordinator moved"),
        };
        assert!(!commit.retains_record());
    }
}
