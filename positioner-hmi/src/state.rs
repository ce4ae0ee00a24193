//! Device State shared by the polling loop and the operator console.
//!
//! The record is split by writer:
//!
//! - [`ControllerFeedback`] is written only by the polling loop, through the
//!   single [`FeedbackWriter`].
//! - [`OperatorCommands`] is written only by the console, through the single
//!   [`CommandWriter`].
//!
//! Neither writer is `Clone`, so each field has exactly one writer. Readers
//! take a [`DeviceSnapshot`] of both halves; each half is internally
//! consistent, the two halves need not be from the same instant.
//!
//! # Home Requests
//!
//! The home bit is a one-shot request that the console raises and the poller
//! consumes. Instead of both sides writing one flag, the console counts
//! requests (`home_requests`) and the poller counts acknowledgements
//! (`home_acknowledged`). The bit on the wire is `requests > acknowledged`,
//! and one write cycle acknowledges everything pending.
//!
//! # Motion Complete
//!
//! The controller's report and the operator's force-complete override are
//! kept apart. The effective value is `force_complete || reported`: while
//! the override is engaged it wins, and it stays engaged until the operator
//! releases it.

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::health::OutcomeKind;

/// Fields owned by the polling loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControllerFeedback {
    /// Last-read positioner angle
    pub current_position: f64,
    /// Position requested by the robot cell
    pub robot_requested_position: f64,
    /// Position the controller is targeting
    pub requested_position: f64,
    /// Robot motion request bit
    pub robot_request: bool,
    /// Motion-complete flag as reported by the controller
    pub motion_complete_reported: bool,
    /// Controller wall-clock seconds from the last good heartbeat
    pub heartbeat_seconds: i64,
    /// Transport "socket connected" sample from the last cycle
    pub connection_ok: bool,
    /// Home requests already sent to the controller
    pub home_acknowledged: u64,
    pub last_outcome: OutcomeKind,
    pub consecutive_failures: u32,
    pub cycles: u64,
}

/// Fields owned by the operator console.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperatorCommands {
    /// Target captured on the last go-to
    pub command_position: f64,
    /// Operator motion request in progress
    pub manual_run: bool,
    /// Number of home requests issued
    pub home_requests: u64,
    /// Force-complete override engaged
    pub force_complete: bool,
}

/// Motion-in-progress state, derived fresh from every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MotionPhase {
    /// No request flag set
    Idle,
    /// A request is set and motion is not complete
    Requested,
    /// A request is set and motion is complete
    Complete,
}

/// Consistent copy of both halves.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub feedback: ControllerFeedback,
    pub commands: OperatorCommands,
}

impl DeviceSnapshot {
    /// Effective motion-complete: the override wins while engaged.
    pub fn motion_complete(&self) -> bool {
        self.commands.force_complete || self.feedback.motion_complete_reported
    }

    /// Either request source is active.
    pub fn motion_requested(&self) -> bool {
        self.feedback.robot_request || self.commands.manual_run
    }

    /// `(robot_request OR manual_run) AND NOT motion_complete`
    pub fn in_progress(&self) -> bool {
        self.motion_requested() && !self.motion_complete()
    }

    /// A home request has been issued but not yet written.
    pub fn home_pending(&self) -> bool {
        self.commands.home_requests > self.feedback.home_acknowledged
    }

    pub fn phase(&self) -> MotionPhase {
        match (self.motion_requested(), self.motion_complete()) {
            (false, _) => MotionPhase::Idle,
            (true, false) => MotionPhase::Requested,
            (true, true) => MotionPhase::Complete,
        }
    }
}

/// Shared storage behind the writer and reader handles.
#[derive(Debug, Default)]
pub struct DeviceState {
    feedback: RwLock<ControllerFeedback>,
    commands: RwLock<OperatorCommands>,
}

impl DeviceState {
    /// Create the state and hand out its only two writers plus a reader.
    pub fn new() -> (FeedbackWriter, CommandWriter, StateReader) {
        let shared = Arc::new(DeviceState::default());
        (
            FeedbackWriter {
                shared: Arc::clone(&shared),
            },
            CommandWriter {
                shared: Arc::clone(&shared),
            },
            StateReader { shared },
        )
    }

    fn feedback(&self) -> ControllerFeedback {
        self.feedback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn commands(&self) -> OperatorCommands {
        self.commands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Sole writer of [`ControllerFeedback`]. Held by the polling loop.
#[derive(Debug)]
pub struct FeedbackWriter {
    shared: Arc<DeviceState>,
}

impl FeedbackWriter {
    /// Mutate the feedback half under its lock.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut ControllerFeedback) -> R) -> R {
        let mut guard = self
            .shared
            .feedback
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn current(&self) -> ControllerFeedback {
        self.shared.feedback()
    }

    pub fn reader(&self) -> StateReader {
        StateReader {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Sole writer of [`OperatorCommands`]. Held by the console.
#[derive(Debug)]
pub struct CommandWriter {
    shared: Arc<DeviceState>,
}

impl CommandWriter {
    /// Mutate the command half under its lock.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut OperatorCommands) -> R) -> R {
        let mut guard = self
            .shared
            .commands
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn current(&self) -> OperatorCommands {
        self.shared.commands()
    }

    pub fn reader(&self) -> StateReader {
        StateReader {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Read-only view; cheap to clone.
#[derive(Debug, Clone)]
pub struct StateReader {
    shared: Arc<DeviceState>,
}

impl StateReader {
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            feedback: self.shared.feedback(),
            commands: self.shared.commands(),
        }
    }

    pub fn feedback(&self) -> ControllerFeedback {
        self.shared.feedback()
    }

    pub fn commands(&self) -> OperatorCommands {
        self.shared.commands()
    }
}
