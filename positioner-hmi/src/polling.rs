//! Polling Loop: runs the PLC Communicator on its own thread at a fixed period.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::communicator::PlcCommunicator;
use crate::health::CycleOutcome;

/// Default polling period.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(100);

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Called after every cycle with its outcome.
pub type CycleCallback = Box<dyn FnMut(&CycleOutcome) + Send>;

/// Handle to the polling thread.
///
/// Cycles run back to back on one thread and never overlap. When a cycle
/// overruns its period the missed ticks are dropped rather than run late in
/// a burst. The thread is stopped and joined on [`shutdown`](Self::shutdown)
/// or drop.
pub struct PollingLoop {
    running: Arc<AtomicBool>,
    skipped_ticks: Arc<AtomicU64>,
    thread: Option<JoinHandle<PlcCommunicator>>,
}

impl PollingLoop {
    pub fn spawn(
        mut communicator: PlcCommunicator,
        period: Duration,
        mut on_cycle: Option<CycleCallback>,
    ) -> std::io::Result<Self> {
        let period = period.max(MIN_PERIOD);
        let running = Arc::new(AtomicBool::new(true));
        let skipped_ticks = Arc::new(AtomicU64::new(0));

        let flag = Arc::clone(&running);
        let skipped = Arc::clone(&skipped_ticks);
        let thread = thread::Builder::new()
            .name("plc-poll".to_string())
            .spawn(move || {
                debug!(
                    "Polling {} every {} ms",
                    communicator.endpoint(),
                    period.as_millis()
                );
                let mut next = Instant::now();
                while flag.load(Ordering::Relaxed) {
                    let outcome = communicator.run();
                    if let Some(callback) = on_cycle.as_mut() {
                        callback(&outcome);
                    }

                    next += period;
                    let now = Instant::now();
                    if now >= next {
                        let missed = missed_ticks(now - next, period);
                        skipped.fetch_add(missed, Ordering::Relaxed);
                        warn!("Poll cycle overran its {} ms period, skipping {missed} tick(s)", period.as_millis());
                        next += period * missed as u32;
                    }

                    while flag.load(Ordering::Relaxed) {
                        let now = Instant::now();
                        if now >= next {
                            break;
                        }
                        thread::park_timeout(next - now);
                    }
                }
                communicator
            })?;

        Ok(Self {
            running,
            skipped_ticks,
            thread: Some(thread),
        })
    }

    /// Number of ticks dropped because a cycle overran.
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped_ticks.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop after the current cycle and hand back the communicator.
    pub fn shutdown(&mut self) -> Option<PlcCommunicator> {
        self.running.store(false, Ordering::Relaxed);
        let thread = self.thread.take()?;
        thread.thread().unpark();
        match thread.join() {
            Ok(communicator) => Some(communicator),
            Err(_) => {
                warn!("Polling thread panicked");
                None
            }
        }
    }
}

impl Drop for PollingLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Ticks whose start time has already passed, given how late we are.
fn missed_ticks(late: Duration, period: Duration) -> u64 {
    (late.as_nanos() / period.as_nanos()) as u64 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DeviceState;
    use plc_link::sim::{PositionerSim, SimClient};
    use plc_link::TagMap;

    fn communicator() -> (PlcCommunicator, crate::state::StateReader) {
        let (feedback, _commands, reader) = DeviceState::new();
        let client = SimClient::new(PositionerSim::new(TagMap::default()));
        (
            PlcCommunicator::new(Box::new(client), TagMap::default(), feedback),
            reader,
        )
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_missed_ticks() {
        let period = Duration::from_millis(100);
        assert_eq!(missed_ticks(Duration::ZERO, period), 1);
        assert_eq!(missed_ticks(Duration::from_millis(99), period), 1);
        assert_eq!(missed_ticks(Duration::from_millis(250), period), 3);
    }

    #[test]
    fn test_runs_cycles_until_shutdown() {
        let (comm, reader) = communicator();
        let mut polling = PollingLoop::spawn(comm, Duration::from_millis(5), None).unwrap();

        assert!(wait_for(|| reader.feedback().cycles >= 3));
        assert!(polling.is_running());

        let comm = polling.shutdown().unwrap();
        let cycles = reader.feedback().cycles;
        assert_eq!(comm.health().totals().cycles, cycles);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(reader.feedback().cycles, cycles);
        assert!(!polling.is_running());
    }

    #[test]
    fn test_callback_sees_every_cycle() {
        let (comm, reader) = communicator();
        let seen = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&seen);
        let callback: CycleCallback = Box::new(move |outcome| {
            assert!(outcome.is_completed());
            counter.fetch_add(1, Ordering::Relaxed);
        });

        let mut polling = PollingLoop::spawn(comm, Duration::from_millis(5), Some(callback)).unwrap();
        assert!(wait_for(|| seen.load(Ordering::Relaxed) >= 2));
        polling.shutdown();
        assert_eq!(seen.load(Ordering::Relaxed), reader.feedback().cycles);
    }

    #[test]
    fn test_overrun_skips_ticks() {
        let (comm, _reader) = communicator();
        let callback: CycleCallback = Box::new(|_| thread::sleep(Duration::from_millis(25)));

        let mut polling = PollingLoop::spawn(comm, Duration::from_millis(5), Some(callback)).unwrap();
        assert!(wait_for(|| polling.skipped_ticks() >= 2));
        polling.shutdown();
    }
}
