//! PLC Communicator: one heartbeat / read / write cycle against the controller.
//!
//! The communicator owns the tag client and the feedback half of Device
//! State. It never schedules itself; [`PollingLoop`](crate::polling::PollingLoop)
//! calls [`run`](PlcCommunicator::run) once per period.
//!
//! Every controller failure is logged and folded into a [`CycleOutcome`].
//! Nothing here panics or stops the caller's loop.

use plc_link::{LinkError, LinkResult, TagClient, TagMap, TagValue};
use tracing::{debug, info, trace, warn};

use crate::health::{CycleFailure, CycleOutcome, CycleStage, LinkHealth};
use crate::state::{FeedbackWriter, StateReader};

/// Values read by [`PlcCommunicator::read_tags`], committed together.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FeedbackSample {
    robot_requested_position: f64,
    current_position: f64,
    requested_position: f64,
    robot_request: bool,
    motion_complete: bool,
}

pub struct PlcCommunicator {
    client: Box<dyn TagClient + Send>,
    tags: TagMap,
    feedback: FeedbackWriter,
    state: StateReader,
    health: LinkHealth,
    offline_reported: bool,
}

impl PlcCommunicator {
    pub fn new(client: Box<dyn TagClient + Send>, tags: TagMap, feedback: FeedbackWriter) -> Self {
        let state = feedback.reader();
        Self {
            client,
            tags,
            feedback,
            state,
            health: LinkHealth::default(),
            offline_reported: false,
        }
    }

    /// Replace the link-health classifier (sets the unreachable threshold).
    pub fn with_health(mut self, health: LinkHealth) -> Self {
        self.health = health;
        self
    }

    pub fn endpoint(&self) -> String {
        self.client.endpoint()
    }

    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    pub fn health(&self) -> &LinkHealth {
        &self.health
    }

    pub fn state(&self) -> StateReader {
        self.state.clone()
    }

    /// Read the controller wall clock and echo it back.
    ///
    /// A read with a failed status keeps the previous heartbeat value and is
    /// not an error; the echo still goes out with the current value. After a
    /// transport failure on the read the echo is skipped, so an unreachable
    /// controller costs one connect attempt per cycle. The transport's
    /// socket status is sampled into `connection_ok` at the end.
    pub fn heartbeat(&mut self) -> LinkResult<()> {
        let result = match self.client.read_i64(&self.tags.wall_clock_seconds) {
            Ok(seconds) => {
                self.feedback.update(|f| f.heartbeat_seconds = seconds);
                self.echo_heartbeat()
            }
            Err(LinkError::BadStatus { status, .. }) => {
                trace!("Heartbeat read status: {status}");
                self.echo_heartbeat()
            }
            Err(e) if e.is_transport() => Err(e),
            Err(e) => {
                if let Err(echo) = self.echo_heartbeat() {
                    debug!("Heartbeat echo failed: {echo}");
                }
                Err(e)
            }
        };

        let connected = self.client.is_connected();
        self.feedback.update(|f| f.connection_ok = connected);

        result
    }

    fn echo_heartbeat(&mut self) -> LinkResult<()> {
        let seconds = self.feedback.current().heartbeat_seconds;
        self.client
            .write(&self.tags.heartbeat_ack, TagValue::Int(seconds))
    }

    /// Read the five feedback tags and commit them only if all succeed.
    pub fn read_tags(&mut self) -> LinkResult<()> {
        match self.sample_feedback() {
            Ok(sample) => {
                self.feedback.update(|f| {
                    f.robot_requested_position = sample.robot_requested_position;
                    f.current_position = sample.current_position;
                    f.requested_position = sample.requested_position;
                    f.robot_request = sample.robot_request;
                    f.motion_complete_reported = sample.motion_complete;
                });
                Ok(())
            }
            Err(e) => {
                warn!("Error reading from PLC: {e}");
                Err(e)
            }
        }
    }

    fn sample_feedback(&mut self) -> LinkResult<FeedbackSample> {
        let client = &mut self.client;
        let tags = &self.tags;
        Ok(FeedbackSample {
            robot_requested_position: client.read_f64(&tags.robot_requested_position)?,
            current_position: client.read_f64(&tags.current_position)?,
            requested_position: client.read_f64(&tags.requested_position)?,
            robot_request: client.read_bool(&tags.robot_request)?,
            motion_complete: client.read_bool(&tags.motion_complete)?,
        })
    }

    /// Write command position, manual run and the home bit.
    ///
    /// Each tag is written even when an earlier one was refused, so a
    /// rejected command position cannot hold back a stop or a home request.
    /// A transport failure ends the sequence since the socket is gone.
    /// The first error is returned.
    ///
    /// A pending home request is acknowledged once its write has been
    /// attempted, whether or not it succeeded, so the home bit is sent by at
    /// most one cycle. If the sequence ended before the home write, the
    /// request stays pending for the next cycle.
    pub fn write_tags(&mut self) -> LinkResult<()> {
        let commands = self.state.commands();
        let acknowledged = self.feedback.current().home_acknowledged;
        let home_bit = commands.home_requests > acknowledged;

        let (result, home_attempted) =
            self.write_outputs(commands.command_position, commands.manual_run, home_bit);

        if home_bit && home_attempted {
            self.feedback
                .update(|f| f.home_acknowledged = commands.home_requests);
            match &result {
                Ok(()) => info!("Home request sent to PLC"),
                Err(_) => warn!("Home request sent in a cycle with failed writes"),
            }
        }
        if let Err(e) = &result {
            warn!("Error writing to PLC: {e}");
        }
        result
    }

    /// Returns the first error and whether the home bit write was attempted.
    fn write_outputs(
        &mut self,
        command_position: f64,
        manual_run: bool,
        home: bool,
    ) -> (LinkResult<()>, bool) {
        let client = &mut self.client;
        let tags = &self.tags;
        let writes = [
            (&tags.command_position, TagValue::Real(command_position)),
            (&tags.manual_run, TagValue::Bool(manual_run)),
            (&tags.home, TagValue::Bool(home)),
        ];
        let total = writes.len();

        let mut result = Ok(());
        let mut attempted = 0;
        for (tag, value) in writes {
            attempted += 1;
            if let Err(e) = client.write(tag, value) {
                let transport = e.is_transport();
                if result.is_ok() {
                    result = Err(e);
                } else {
                    debug!("Write {tag} failed: {e}");
                }
                if transport {
                    break;
                }
            }
        }
        (result, attempted == total)
    }

    /// One full cycle: heartbeat, then read and write if the socket is up.
    ///
    /// Read always runs before write so commands go out against fresh
    /// feedback. A failed read does not prevent the write. The outcome names
    /// the first stage that failed and is published to Device State.
    pub fn run(&mut self) -> CycleOutcome {
        let heartbeat = self.heartbeat();

        let result = if self.client.is_connected() {
            if self.offline_reported {
                info!("PLC connected at {}", self.client.endpoint());
                self.offline_reported = false;
            }
            let read = self.read_tags();
            let write = self.write_tags();
            stage(CycleStage::Heartbeat, heartbeat)
                .and(stage(CycleStage::Read, read))
                .and(stage(CycleStage::Write, write))
        } else {
            if !self.offline_reported {
                warn!("No PLC found at {}... retrying", self.client.endpoint());
                self.offline_reported = true;
            } else {
                debug!("No PLC found at {}... retrying", self.client.endpoint());
            }
            if let Err(e) = heartbeat {
                debug!("Heartbeat failed: {e}");
            }
            Err(CycleFailure::NotConnected)
        };

        let outcome = self.health.record(result);
        let kind = outcome.kind();
        let failures = self.health.consecutive_failures();
        let cycles = self.health.totals().cycles;
        self.feedback.update(|f| {
            f.last_outcome = kind;
            f.consecutive_failures = failures;
            f.cycles = cycles;
        });
        outcome
    }
}

fn stage(stage: CycleStage, result: LinkResult<()>) -> Result<(), CycleFailure> {
    result.map_err(|error| CycleFailure::Exchange { stage, error })
}
