//! Link health classification for polling cycles.
//!
//! Every cycle of the polling loop ends in a [`CycleOutcome`]. A single
//! failed cycle is `Transient`: the next tick retries it. Once failures run
//! back to back for `unreachable_after` cycles the outcome becomes `Fatal`,
//! which tells a monitoring layer the controller is gone rather than
//! dropping the odd read. The loop keeps polling either way.

use std::fmt;

use plc_link::LinkError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

/// Default number of consecutive failed cycles before the link is
/// considered unreachable (5 s at the 100 ms poll period).
pub const DEFAULT_UNREACHABLE_AFTER: u32 = 50;

/// Step of the polling cycle that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CycleStage {
    Heartbeat,
    Read,
    Write,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleStage::Heartbeat => "heartbeat",
            CycleStage::Read => "read",
            CycleStage::Write => "write",
        };
        f.write_str(name)
    }
}

/// Why a cycle did not complete.
#[derive(Error, Debug)]
pub enum CycleFailure {
    /// Transport reported no socket; read and write were skipped.
    #[error("not connected")]
    NotConnected,
    /// A tag exchange failed.
    #[error("{stage} failed: {error}")]
    Exchange {
        stage: CycleStage,
        #[source]
        error: LinkError,
    },
}

/// Result of one polling cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Heartbeat, read and write all succeeded.
    Completed,
    /// The cycle failed; the next tick is expected to recover.
    Transient(CycleFailure),
    /// The cycle failed and failures have persisted long enough to call the
    /// controller unreachable.
    Fatal(CycleFailure),
}

impl CycleOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            CycleOutcome::Completed => OutcomeKind::Completed,
            CycleOutcome::Transient(CycleFailure::NotConnected) => OutcomeKind::Skipped,
            CycleOutcome::Transient(_) => OutcomeKind::Transient,
            CycleOutcome::Fatal(_) => OutcomeKind::Fatal,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed)
    }

    pub fn failure(&self) -> Option<&CycleFailure> {
        match self {
            CycleOutcome::Completed => None,
            CycleOutcome::Transient(f) | CycleOutcome::Fatal(f) => Some(f),
        }
    }
}

/// Copyable summary of a [`CycleOutcome`], published in Device State.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum OutcomeKind {
    /// No cycle has run yet.
    #[default]
    NotRun,
    Completed,
    /// Not connected; I/O skipped this cycle.
    Skipped,
    Transient,
    Fatal,
}

impl OutcomeKind {
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeKind::NotRun => "not run",
            OutcomeKind::Completed => "ok",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::Transient => "transient failure",
            OutcomeKind::Fatal => "unreachable",
        }
    }
}

/// Running totals by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthTotals {
    pub cycles: u64,
    pub completed: u64,
    pub skipped: u64,
    pub transient: u64,
    pub fatal: u64,
}

/// Tracks consecutive failures and classifies each cycle.
#[derive(Debug, Clone)]
pub struct LinkHealth {
    unreachable_after: u32,
    consecutive_failures: u32,
    totals: HealthTotals,
}

impl LinkHealth {
    pub fn new(unreachable_after: u32) -> Self {
        Self {
            unreachable_after: unreachable_after.max(1),
            consecutive_failures: 0,
            totals: HealthTotals::default(),
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn totals(&self) -> HealthTotals {
        self.totals
    }

    pub fn is_unreachable(&self) -> bool {
        self.consecutive_failures >= self.unreachable_after
    }

    /// Classify the result of one cycle and update the counters.
    pub fn record(&mut self, result: Result<(), CycleFailure>) -> CycleOutcome {
        self.totals.cycles += 1;

        let failure = match result {
            Ok(()) => {
                if self.is_unreachable() {
                    info!(
                        "Controller link restored after {} failed cycles",
                        self.consecutive_failures
                    );
                }
                self.consecutive_failures = 0;
                self.totals.completed += 1;
                return CycleOutcome::Completed;
            }
            Err(failure) => failure,
        };

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.is_unreachable() {
            if self.consecutive_failures == self.unreachable_after {
                error!(
                    "Controller unreachable: {} consecutive failed cycles, last: {failure}",
                    self.consecutive_failures
                );
            }
            self.totals.fatal += 1;
            CycleOutcome::Fatal(failure)
        } else {
            match failure {
                CycleFailure::NotConnected => self.totals.skipped += 1,
                CycleFailure::Exchange { .. } => self.totals.transient += 1,
            }
            CycleOutcome::Transient(failure)
        }
    }
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self::new(DEFAULT_UNREACHABLE_AFTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeout() -> CycleFailure {
        CycleFailure::Exchange {
            stage: CycleStage::Read,
            error: LinkError::Timeout,
        }
    }

    #[test]
    fn test_failure_keeps_link_error_as_source() {
        use std::error::Error as _;

        let failure = timeout();
        assert!(failure.to_string().starts_with("read failed: "));
        let source = failure.source().map(|e| e.to_string());
        assert_eq!(source, Some(LinkError::Timeout.to_string()));
        assert!(CycleFailure::NotConnected.source().is_none());
    }

    #[test]
    fn test_single_failure_is_transient() {
        let mut health = LinkHealth::new(3);
        let outcome = health.record(Err(timeout()));
        assert_eq!(outcome.kind(), OutcomeKind::Transient);
        assert_eq!(health.consecutive_failures(), 1);
    }

    #[test]
    fn test_not_connected_is_skipped() {
        let mut health = LinkHealth::new(3);
        let outcome = health.record(Err(CycleFailure::NotConnected));
        assert_eq!(outcome.kind(), OutcomeKind::Skipped);
        assert_eq!(health.totals().skipped, 1);
    }

    #[test]
    fn test_escalates_to_fatal_then_recovers() {
        let mut health = LinkHealth::new(3);
        assert_eq!(health.record(Err(timeout())).kind(), OutcomeKind::Transient);
        assert_eq!(
            health.record(Err(CycleFailure::NotConnected)).kind(),
            OutcomeKind::Skipped
        );
        assert_eq!(health.record(Err(timeout())).kind(), OutcomeKind::Fatal);
        assert_eq!(health.record(Err(timeout())).kind(), OutcomeKind::Fatal);
        assert!(health.is_unreachable());

        assert!(health.record(Ok(())).is_completed());
        assert!(!health.is_unreachable());
        assert_eq!(health.consecutive_failures(), 0);
        assert_eq!(health.record(Err(timeout())).kind(), OutcomeKind::Transient);
    }

    #[test]
    fn test_totals() {
        let mut health = LinkHealth::new(2);
        health.record(Ok(()));
        health.record(Err(timeout()));
        health.record(Err(timeout()));
        let totals = health.totals();
        assert_eq!(totals.cycles, 3);
        assert_eq!(totals.completed, 1);
        assert_eq!(totals.transient, 1);
        assert_eq!(totals.fatal, 1);
    }

    #[test]
    fn test_failure_message() {
        let failure = CycleFailure::Exchange {
            stage: CycleStage::Write,
            error: LinkError::Timeout,
        };
        assert_eq!(failure.to_string(), "write failed: Timeout waiting for response");
    }
}
