//! The consume → guarded forward → commit loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::config::LoopConfig;
use crate::observability::metrics;
use crate::relay::error::RelayError;
use crate::resilience::timeouts::with_timeout;
use crate::resilience::{CircuitBreaker, CircuitState, Clock, FailurePolicy, SystemClock};
use crate::transport::{Record, Transport};

/// Timing knobs of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayTimings {
    pub poll_timeout: Duration,
    pub cooldown: Duration,
    pub send_timeout: Duration,
}

impl From<&LoopConfig> for RelayTimings {
    fn from(config: &LoopConfig) -> Self {
        Self {
            poll_timeout: config.poll_timeout(),
            cooldown: config.cooldown(),
            send_timeout: config.send_timeout(),
        }
    }
}

impl Default for RelayTimings {
    fn default() -> Self {
        Self::from(&LoopConfig::default())
    }
}

/// Counters accumulated over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub received: u64,
    pub forwarded: u64,
    /// Sends that failed in a breaker-relevant way (record retried).
    pub failed: u64,
    /// Records the destination rejected outright (record skipped).
    pub skipped: u64,
    /// Attempts refused by the breaker.
    pub refused: u64,
    pub commit_failures: u64,
    pub receive_errors: u64,
}

/// Single-worker relay between the two partitions of a [`Transport`].
pub struct RelayLoop<T: Transport, C: Clock = SystemClock> {
    transport: T,
    breaker: Arc<CircuitBreaker<C>>,
    policy: FailurePolicy,
    timings: RelayTimings,
    /// Record read but not yet delivered; retried before anything new is read.
    pending: Option<Record>,
    intake_paused: bool,
    stats: RelayStats,
}

/// True once shutdown was triggered or the coordinator is gone.
fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}

/// Sleep for `pause`; true if shutdown fired first.
async fn wait_or_shutdown(shutdown: &mut broadcast::Receiver<()>, pause: Duration) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.recv() => true,
        _ = tokio::time::sleep(pause) => false,
    }
}

impl<T: Transport, C: Clock> RelayLoop<T, C> {
    pub fn new(
        transport: T,
        breaker: Arc<CircuitBreaker<C>>,
        policy: FailurePolicy,
        timings: RelayTimings,
    ) -> Self {
        Self {
            transport,
            breaker,
            policy,
            timings,
            pending: None,
            intake_paused: false,
            stats: RelayStats::default(),
        }
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// Run until the shutdown signal fires.
    ///
    /// An in-flight send is never cancelled: it completes or hits the send
    /// timeout, its commit (if any) is issued, and only then does the loop
    /// exit. A record still pending at exit stays uncommitted and will be
    /// read again by the next run.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> RelayStats {
        let breaker = self.breaker.config();
        tracing::info!(
            breaker = %self.breaker.name(),
            failure_ratio = breaker.failure_ratio,
            minimum_throughput = breaker.minimum_throughput,
            break_duration_ms = breaker.break_duration.as_millis() as u64,
            poll_timeout_ms = self.timings.poll_timeout.as_millis() as u64,
            cooldown_ms = self.timings.cooldown.as_millis() as u64,
            send_timeout_ms = self.timings.send_timeout.as_millis() as u64,
            "Relay loop starting"
        );

        loop {
            if shutdown_requested(&mut shutdown) {
                break;
            }

            let record = match self.pending.take() {
                Some(record) => record,
                None => {
                    self.resume_if_recovered().await;
                    let received = tokio::select! {
                        biased;
                        _ = shutdown.recv() => break,
                        received = self.transport.receive(self.timings.poll_timeout) => received,
                    };
                    match received {
                        Ok(Some(record)) => {
                            self.stats.received += 1;
                            record
                        }
                        Ok(None) => continue,
                        Err(e) => {
                            self.report(&RelayError::Receive(e));
                            if wait_or_shutdown(&mut shutdown, self.timings.poll_timeout).await {
                                break;
                            }
                            continue;
                        }
                    }
                }
            };

            let Err(err) = self.forward(&record).await else {
                continue;
            };
            self.report(&err);
            if !err.retains_record() {
                continue;
            }

            self.pending = Some(record);
            let pause = match err {
                RelayError::CircuitOpen { .. } => {
                    self.pause_intake().await;
                    self.timings.cooldown
                }
                // Still closed: pace retries until the window trips.
                _ if self.breaker.state() == CircuitState::Closed => self.timings.poll_timeout,
                _ => continue,
            };
            if wait_or_shutdown(&mut shutdown, pause).await {
                break;
            }
        }

        if let Some(record) = &self.pending {
            tracing::info!(
                offset = record.offset(),
                partition = %record.partition(),
                "Stopping with undelivered record, it will be read again on restart"
            );
        }
        tracing::info!(
            received = self.stats.received,
            forwarded = self.stats.forwarded,
            failed = self.stats.failed,
            skipped = self.stats.skipped,
            refused = self.stats.refused,
            "Relay loop stopped"
        );
        self.stats
    }

    /// One guarded attempt: permit, send, report, commit.
    async fn forward(&mut self, record: &Record) -> Result<(), RelayError> {
        if !self.breaker.permit() {
            return Err(RelayError::CircuitOpen {
                state: self.breaker.state(),
            });
        }

        let started = Instant::now();
        let result = with_timeout(self.timings.send_timeout, self.transport.send(record)).await;
        metrics::record_send_duration(started);

        let outcome = self.policy.outcome_of(&result);
        let breaker_relevant = outcome.is_failure();
        self.breaker.report_outcome(outcome);

        if let Err(source) = result {
            return Err(RelayError::Send {
                offset: record.offset(),
                source,
                breaker_relevant,
            });
        }

        self.stats.forwarded += 1;
        metrics::record_forward("success");
        tracing::debug!(
            offset = record.offset(),
            partition = %record.partition(),
            "Forwarded record"
        );

        self.transport
            .commit(record)
            .await
            .map_err(|source| RelayError::Commit {
                offset: record.offset(),
                source,
            })
    }

    fn report(&mut self, err: &RelayError) {
        match err {
            RelayError::Receive(e) => {
                self.stats.receive_errors += 1;
                metrics::record_receive_error();
                tracing::warn!(error = %e, "Receive failed");
            }
            RelayError::CircuitOpen { state } => {
                self.stats.refused += 1;
                metrics::record_refused();
                tracing::info!(
                    state = %state,
                    cooldown_ms = self.timings.cooldown.as_millis() as u64,
                    "Circuit not accepting attempts, holding record"
                );
            }
            RelayError::Send {
                offset,
                source,
                breaker_relevant: true,
            } => {
                self.stats.failed += 1;
                metrics::record_forward("failure");
                let snapshot = self.breaker.snapshot();
                tracing::warn!(
                    offset,
                    error = %source,
                    state = %snapshot.state,
                    failure_ratio = snapshot.failure_ratio,
                    "Forward failed, record will be retried"
                );
            }
            RelayError::Send { offset, source, .. } => {
                self.stats.skipped += 1;
                metrics::record_forward("rejected");
                tracing::error!(offset, error = %source, "Destination rejected record, skipping it");
            }
            RelayError::Commit { offset, source } => {
                self.stats.commit_failures += 1;
                metrics::record_commit_failure();
                tracing::warn!(offset, error = %source, "Commit failed after delivery");
            }
        }
    }

    async fn pause_intake(&mut self) {
        if self.intake_paused {
            return;
        }
        match self.transport.pause_intake().await {
            Ok(()) => {
                self.intake_paused = true;
                metrics::record_intake_paused(true);
                tracing::info!("Intake paused");
            }
            Err(e) => tracing::warn!(error = %e, "Failed to pause intake"),
        }
    }

    /// Resume intake once the breaker has closed again.
    async fn resume_if_recovered(&mut self) {
        if !self.intake_paused || self.breaker.state() != CircuitState::Closed {
            return;
        }
        match self.transport.resume_intake().await {
            Ok(()) => {
                self.intake_paused = false;
                metrics::record_intake_paused(false);
                tracing::info!("Intake resumed");
            }
            Err(e) => tracing::warn!(error = %e, "Failed to resume intake"),
        }
    }
}
