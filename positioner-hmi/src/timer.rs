//! One-shot timer driven by the caller's clock.
//!
//! The timer does not run on its own thread. The owner calls
//! [`poll`](OneShotTimer::poll) from its loop and gets `true` exactly once
//! when the deadline passes.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct OneShotTimer {
    duration: Duration,
    deadline: Option<Instant>,
}

impl OneShotTimer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            deadline: None,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Start the countdown from `now`. Does nothing if already armed.
    pub fn arm(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.duration);
        }
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left before expiry, `None` when not armed.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Returns `true` once when the deadline has passed, and disarms.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_fires_once_after_duration() {
        let start = Instant::now();
        let mut timer = OneShotTimer::new(SECOND);
        timer.arm(start);

        assert!(!timer.poll(start + Duration::from_millis(999)));
        assert!(timer.poll(start + SECOND));
        assert!(!timer.is_armed());
        assert!(!timer.poll(start + 2 * SECOND));
    }

    #[test]
    fn test_rearm_while_armed_keeps_deadline() {
        let start = Instant::now();
        let mut timer = OneShotTimer::new(SECOND);
        timer.arm(start);
        timer.arm(start + Duration::from_millis(600));

        assert_eq!(
            timer.remaining(start + Duration::from_millis(600)),
            Some(Duration::from_millis(400))
        );
        assert!(timer.poll(start + SECOND));
    }

    #[test]
    fn test_disarm_prevents_firing() {
        let start = Instant::now();
        let mut timer = OneShotTimer::new(SECOND);
        timer.arm(start);
        timer.disarm();
        assert_eq!(timer.remaining(start), None);
        assert!(!timer.poll(start + 2 * SECOND));
    }

    #[test]
    fn test_unarmed_never_fires() {
        let mut timer = OneShotTimer::new(Duration::ZERO);
        assert!(!timer.poll(Instant::now()));
    }
}
