//! Console Controller: operator commands and the display-loop render step.
//!
//! The console owns the command half of Device State. Operator actions
//! mutate it directly; [`tick`](ConsoleController::tick) runs once per
//! display period, drives the completion timer and returns a
//! [`ConsoleView`] for whatever front end draws it. Nothing here touches the
//! controller, so a tick never blocks on PLC I/O.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::access::{login, AccessError, AccessLevel, Credentials, Session};
use crate::health::OutcomeKind;
use crate::state::{CommandWriter, DeviceSnapshot, StateReader};
use crate::timer::OneShotTimer;

/// Delay between motion complete and releasing a manual run.
pub const DEFAULT_COMPLETION_DELAY: Duration = Duration::from_millis(1000);

/// Default display loop period.
pub const DEFAULT_DISPLAY_PERIOD: Duration = Duration::from_millis(10);

/// State of the go-to button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GoToState {
    /// No manual run
    Idle,
    /// Manual run requested, motion not yet complete
    Running,
    /// Motion complete, completion delay counting down
    Settling,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Indicators {
    pub robot_request: bool,
    pub in_progress: bool,
    pub complete: bool,
}

/// Everything a front end needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleView {
    pub current_position: f64,
    /// Operator-entered target
    pub target: f64,
    /// Target captured by the last go-to
    pub command_position: f64,
    pub requested_position: f64,
    pub robot_requested_position: f64,
    pub indicators: Indicators,
    pub go_to: GoToState,
    pub force_complete: bool,
    pub home_pending: bool,
    pub connection_ok: bool,
    pub heartbeat_seconds: i64,
    pub outcome: OutcomeKind,
    pub consecutive_failures: u32,
    pub access: AccessLevel,
    pub status: String,
}

pub struct ConsoleController {
    commands: CommandWriter,
    state: StateReader,
    completion: OneShotTimer,
    target: f64,
    status: String,
    credentials: Credentials,
    session: Option<Session>,
}

impl ConsoleController {
    pub fn new(commands: CommandWriter) -> Self {
        let state = commands.reader();
        Self {
            commands,
            state,
            completion: OneShotTimer::new(DEFAULT_COMPLETION_DELAY),
            target: 0.0,
            status: String::new(),
            credentials: Credentials::default(),
            session: None,
        }
    }

    pub fn with_completion_delay(mut self, delay: Duration) -> Self {
        self.completion = OneShotTimer::new(delay);
        self
    }

    /// Engineering credentials. When configured, force-complete needs a login.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn access_level(&self) -> AccessLevel {
        self.session
            .as_ref()
            .map_or(AccessLevel::Operator, |s| s.level)
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<AccessLevel, AccessError> {
        match login(&self.credentials, username, password) {
            Ok(session) => {
                info!("Engineering login by {username}");
                let level = session.level;
                self.session = Some(session);
                self.status = "Engineering access granted".to_string();
                Ok(level)
            }
            Err(e) => {
                self.status = e.to_string();
                Err(e)
            }
        }
    }

    pub fn logout(&mut self) {
        self.session = None;
    }

    /// Start a manual run to the current target, or cancel the one running.
    pub fn go_to(&mut self) {
        let target = self.target;
        let started = self.commands.update(|c| {
            if c.manual_run {
                c.manual_run = false;
                false
            } else {
                c.command_position = target;
                c.manual_run = true;
                true
            }
        });
        if started {
            self.status = format!("Requesting motion to {target:.1} degrees");
            info!("{}", self.status);
        } else {
            info!("Manual run cancelled");
        }
    }

    /// Queue a one-shot re-zero request.
    pub fn home(&mut self) {
        self.commands.update(|c| c.home_requests += 1);
        self.status = "Re-zeroed encoder".to_string();
        info!("Home requested");
    }

    pub fn stop(&mut self) {
        self.commands.update(|c| c.manual_run = false);
    }

    /// Engage or release the force-complete override.
    ///
    /// When engineering credentials are configured the override can only be
    /// engaged from an engineering session. Releasing it is always allowed.
    pub fn set_force_complete(&mut self, engaged: bool) -> Result<(), AccessError> {
        if engaged
            && self.credentials.is_configured()
            && self.access_level() < AccessLevel::Engineering
        {
            let e = AccessError::Insufficient {
                required: AccessLevel::Engineering,
            };
            self.status = e.to_string();
            return Err(e);
        }
        self.commands.update(|c| c.force_complete = engaged);
        info!(
            "Force complete {}",
            if engaged { "engaged" } else { "released" }
        );
        Ok(())
    }

    pub fn toggle_force_complete(&mut self) -> Result<(), AccessError> {
        let engaged = self.commands.current().force_complete;
        self.set_force_complete(!engaged)
    }

    /// Change the operator target. Any edit cancels a manual run.
    pub fn edit_requested_position(&mut self, target: f64) {
        self.target = target;
        self.commands.update(|c| c.manual_run = false);
    }

    /// Nudge the target by `delta`, as a spinner step.
    pub fn step_requested_position(&mut self, delta: f64) {
        self.edit_requested_position(self.target + delta);
    }

    /// Display loop step: run the completion timer and build the view.
    pub fn tick(&mut self, now: Instant) -> ConsoleView {
        if self.completion.poll(now) {
            self.commands.update(|c| c.manual_run = false);
            self.status = "Motion complete".to_string();
            info!("Motion complete");
        }

        let snapshot = self.state.snapshot();
        if snapshot.motion_complete() {
            if snapshot.commands.manual_run {
                self.completion.arm(now);
            }
        } else {
            self.completion.disarm();
        }

        self.view(&snapshot)
    }

    fn view(&self, snapshot: &DeviceSnapshot) -> ConsoleView {
        let feedback = &snapshot.feedback;
        let commands = &snapshot.commands;

        let go_to = match (commands.manual_run, self.completion.is_armed()) {
            (false, _) => GoToState::Idle,
            (true, false) => GoToState::Running,
            (true, true) => GoToState::Settling,
        };

        ConsoleView {
            current_position: feedback.current_position,
            target: self.target,
            command_position: commands.command_position,
            requested_position: feedback.requested_position,
            robot_requested_position: feedback.robot_requested_position,
            indicators: Indicators {
                robot_request: feedback.robot_request,
                in_progress: snapshot.in_progress(),
                complete: snapshot.motion_complete(),
            },
            go_to,
            force_complete: commands.force_complete,
            home_pending: snapshot.home_pending(),
            connection_ok: feedback.connection_ok,
            heartbeat_seconds: feedback.heartbeat_seconds,
            outcome: feedback.last_outcome,
            consecutive_failures: feedback.consecutive_failures,
            access: self.access_level(),
            status: self.status.clone(),
        }
    }
}
