//! Simulated positioner controller.
//!
//! [`PositionerSim`] keeps a tag table with the same tags the real PLC
//! program exposes and a crude model of the positioner axis:
//!
//! - While the manual-run bit is set the axis slews toward `CommandPos`.
//!   Otherwise, while the robot-request bit is set, it slews toward
//!   `RobotRequestedPosition`.
//! - `PositionerMotionOk` is true while a request is active and the axis is
//!   within tolerance of the target.
//! - A rising edge on the home bit re-zeroes the position feedback.
//! - The wall-clock seconds tag follows the host clock (0-59).
//!
//! Use [`SimClient`] to drive it in-process, or
//! [`GatewayServer`](server::GatewayServer) to expose it over TCP.

pub mod server;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::client::TagClient;
use crate::error::{LinkError, LinkResult};
use crate::tag::{TagResponse, TagStatus, TagValue};
use crate::tag_map::{TagMap, TagRole};

/// Axis model parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimParams {
    /// Slew rate in degrees per second
    pub slew_rate: f64,
    /// Distance from target at which motion counts as complete, in degrees
    pub tolerance: f64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            slew_rate: 30.0,
            tolerance: 0.05,
        }
    }
}

/// In-memory model of the positioner PLC.
#[derive(Debug)]
pub struct PositionerSim {
    tags: TagMap,
    params: SimParams,
    current_position: f64,
    command_position: f64,
    requested_position: f64,
    robot_requested_position: f64,
    manual_run: bool,
    home: bool,
    robot_request: bool,
    motion_complete: bool,
    heartbeat_ack: i64,
    fixed_clock: Option<i64>,
    last_advance: Option<Instant>,
}

impl PositionerSim {
    pub fn new(tags: TagMap) -> Self {
        Self::with_params(tags, SimParams::default())
    }

    pub fn with_params(tags: TagMap, params: SimParams) -> Self {
        Self {
            tags,
            params,
            current_position: 0.0,
            command_position: 0.0,
            requested_position: 0.0,
            robot_requested_position: 0.0,
            manual_run: false,
            home: false,
            robot_request: false,
            motion_complete: false,
            heartbeat_ack: 0,
            fixed_clock: None,
            last_advance: None,
        }
    }

    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    pub fn current_position(&self) -> f64 {
        self.current_position
    }

    pub fn command_position(&self) -> f64 {
        self.command_position
    }

    pub fn manual_run(&self) -> bool {
        self.manual_run
    }

    pub fn motion_complete(&self) -> bool {
        self.motion_complete
    }

    /// Last value the HMI echoed to the heartbeat acknowledgement tag.
    pub fn heartbeat_ack(&self) -> i64 {
        self.heartbeat_ack
    }

    /// Pin the wall-clock seconds tag to a fixed value (tests).
    pub fn set_clock(&mut self, seconds: Option<i64>) {
        self.fixed_clock = seconds;
    }

    /// Move the axis directly, bypassing the slew model.
    pub fn set_current_position(&mut self, position: f64) {
        self.current_position = position;
    }

    /// Raise the robot request bit with a target, as the robot cell would.
    pub fn request_robot_move(&mut self, position: f64) {
        self.robot_requested_position = position;
        self.robot_request = true;
        info!("Sim: robot requests move to {position:.1}");
    }

    pub fn clear_robot_request(&mut self) {
        self.robot_request = false;
    }

    fn clock_seconds(&self) -> i64 {
        self.fixed_clock.unwrap_or_else(|| {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            (secs % 60) as i64
        })
    }

    fn active_target(&self) -> Option<f64> {
        if self.manual_run {
            Some(self.command_position)
        } else if self.robot_request {
            Some(self.robot_requested_position)
        } else {
            None
        }
    }

    /// Advance the axis model by `dt`.
    pub fn step(&mut self, dt: Duration) {
        let Some(target) = self.active_target() else {
            self.motion_complete = false;
            return;
        };
        self.requested_position = target;

        let max_step = self.params.slew_rate * dt.as_secs_f64();
        let error = target - self.current_position;
        if error.abs() <= max_step {
            self.current_position = target;
        } else {
            self.current_position += max_step.copysign(error);
        }
        self.motion_complete = (target - self.current_position).abs() <= self.params.tolerance;
    }

    /// Advance the model to wall time `now`.
    pub fn advance(&mut self, now: Instant) {
        if let Some(last) = self.last_advance {
            self.step(now.saturating_duration_since(last));
        }
        self.last_advance = Some(now);
    }

    /// Answer a tag read the way the controller would.
    pub fn read_tag(&self, tag: &str) -> TagResponse {
        let Some(role) = self.tags.role_of(tag) else {
            return TagResponse::failure(tag, TagStatus::PathSegmentError);
        };
        let value = match role {
            TagRole::WallClockSeconds => TagValue::Int(self.clock_seconds()),
            TagRole::HeartbeatAck => TagValue::Int(self.heartbeat_ack),
            TagRole::CommandPosition => TagValue::Real(self.command_position),
            TagRole::ManualRun => TagValue::Bool(self.manual_run),
            TagRole::Home => TagValue::Bool(self.home),
            TagRole::RobotRequestedPosition => TagValue::Real(self.robot_requested_position),
            TagRole::CurrentPosition => TagValue::Real(self.current_position),
            TagRole::RequestedPosition => TagValue::Real(self.requested_position),
            TagRole::RobotRequest => TagValue::Bool(self.robot_request),
            TagRole::MotionComplete => TagValue::Bool(self.motion_complete),
        };
        TagResponse::success(tag, value)
    }

    /// Apply a tag write the way the controller would.
    ///
    /// Only HMI outputs are writable; everything else is rejected with
    /// `Service not supported`.
    pub fn write_tag(&mut self, tag: &str, value: TagValue) -> Result<(), TagStatus> {
        let role = self
            .tags
            .role_of(tag)
            .ok_or(TagStatus::PathSegmentError)?;
        let type_error = || TagStatus::Other("Invalid data type".to_string());

        match role {
            TagRole::HeartbeatAck => {
                self.heartbeat_ack = value.as_i64().ok_or_else(type_error)?;
            }
            TagRole::CommandPosition => {
                self.command_position = value.as_f64().ok_or_else(type_error)?;
            }
            TagRole::ManualRun => {
                self.manual_run = value.as_bool().ok_or_else(type_error)?;
            }
            TagRole::Home => {
                let home = value.as_bool().ok_or_else(type_error)?;
                if home && !self.home {
                    info!("Sim: home requested, re-zeroing position feedback");
                    self.current_position = 0.0;
                }
                self.home = home;
            }
            _ => return Err(TagStatus::ServiceNotSupported),
        }
        Ok(())
    }
}

fn lock(sim: &Mutex<PositionerSim>) -> MutexGuard<'_, PositionerSim> {
    sim.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
struct Faults {
    connected: AtomicBool,
    failures_pending: AtomicUsize,
    rejected: Mutex<HashMap<String, TagStatus>>,
    writes: Mutex<VecDeque<(String, TagValue)>>,
}

/// Maximum number of writes kept for inspection.
const WRITE_LOG_CAPACITY: usize = 1024;

/// Handle for steering a [`SimClient`] from the outside (tests, demos).
#[derive(Debug, Clone)]
pub struct SimHandle {
    sim: Arc<Mutex<PositionerSim>>,
    faults: Arc<Faults>,
}

impl SimHandle {
    /// Run a closure against the simulator.
    pub fn with_sim<R>(&self, f: impl FnOnce(&mut PositionerSim) -> R) -> R {
        f(&mut lock(&self.sim))
    }

    /// Simulate the transport losing or regaining its socket.
    pub fn set_connected(&self, connected: bool) {
        self.faults.connected.store(connected, Ordering::Relaxed);
    }

    /// Make the next `count` exchanges fail with a timeout.
    pub fn inject_failures(&self, count: usize) {
        self.faults.failures_pending.store(count, Ordering::Relaxed);
    }

    /// Answer reads and writes of `tag` with a failed status (or stop doing so).
    pub fn reject_tag(&self, tag: &str, status: Option<TagStatus>) {
        let mut rejected = self.faults.rejected.lock().unwrap_or_else(|e| e.into_inner());
        match status {
            Some(status) => rejected.insert(tag.to_string(), status),
            None => rejected.remove(tag),
        };
    }

    /// Writes accepted by the simulator, oldest first.
    pub fn writes(&self) -> Vec<(String, TagValue)> {
        let writes = self.faults.writes.lock().unwrap_or_else(|e| e.into_inner());
        writes.iter().cloned().collect()
    }

    pub fn clear_writes(&self) {
        self.faults
            .writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

/// In-process [`TagClient`] backed by a shared [`PositionerSim`].
///
/// Time advances on every exchange using the host monotonic clock, so the
/// axis moves at its slew rate while the HMI polls.
pub struct SimClient {
    handle: SimHandle,
}

impl SimClient {
    /// Create a connected client around a simulator.
    pub fn new(sim: PositionerSim) -> Self {
        let faults = Faults::default();
        faults.connected.store(true, Ordering::Relaxed);
        Self {
            handle: SimHandle {
                sim: Arc::new(Mutex::new(sim)),
                faults: Arc::new(faults),
            },
        }
    }

    /// Handle for fault injection and inspection.
    pub fn handle(&self) -> SimHandle {
        self.handle.clone()
    }

    fn check_link(&self) -> LinkResult<()> {
        let faults = &self.handle.faults;
        if !faults.connected.load(Ordering::Relaxed) {
            return Err(LinkError::NotConnected(self.endpoint()));
        }
        let pending = faults.failures_pending.load(Ordering::Relaxed);
        if pending > 0 {
            faults.failures_pending.store(pending - 1, Ordering::Relaxed);
            return Err(LinkError::Timeout);
        }
        Ok(())
    }

    fn rejection(&self, tag: &str) -> Option<TagStatus> {
        let rejected = self.handle.faults.rejected.lock().unwrap_or_else(|e| e.into_inner());
        rejected.get(tag).cloned()
    }
}

impl TagClient for SimClient {
    fn read(&mut self, tag: &str) -> LinkResult<TagResponse> {
        self.check_link()?;
        if let Some(status) = self.rejection(tag) {
            return Ok(TagResponse::failure(tag, status));
        }
        let mut sim = lock(&self.handle.sim);
        sim.advance(Instant::now());
        Ok(sim.read_tag(tag))
    }

    fn write(&mut self, tag: &str, value: TagValue) -> LinkResult<()> {
        self.check_link()?;
        if let Some(status) = self.rejection(tag) {
            return Err(LinkError::BadStatus {
                tag: tag.to_string(),
                status,
            });
        }
        let mut sim = lock(&self.handle.sim);
        sim.advance(Instant::now());
        sim.write_tag(tag, value)
            .map_err(|status| LinkError::BadStatus {
                tag: tag.to_string(),
                status,
            })?;
        drop(sim);

        debug!("Sim write {tag} = {value}");
        let mut writes = self.handle.faults.writes.lock().unwrap_or_else(|e| e.into_inner());
        if writes.len() == WRITE_LOG_CAPACITY {
            writes.pop_front();
        }
        writes.push_back((tag.to_string(), value));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.handle.faults.connected.load(Ordering::Relaxed)
    }

    fn endpoint(&self) -> String {
        "simulator".to_string()
    }
}
