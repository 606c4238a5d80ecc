//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap downstream calls with a deadline
//! - Surface an elapsed deadline as a `Timeout` transport error
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the wrapped future is dropped on expiry
//! - Timeout errors are distinct from other errors so they can be classified

use std::future::Future;
use std::time::Duration;

use crate::transport::{TransportError, TransportResult};

/// Await `fut` for at most `limit`.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> TransportResult<T>
where
    F: Future<Output = TransportResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::timeout(limit)),
    }
}
