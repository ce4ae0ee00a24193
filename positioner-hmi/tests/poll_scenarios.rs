//! Polling loop and console driven together against the simulated controller.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use plc_link::sim::server::GatewayServer;
use plc_link::sim::{PositionerSim, SimClient, SimHandle, SimParams};
use plc_link::{GatewayClient, TagMap, TagStatus, TagValue};
use positioner_hmi::communicator::PlcCommunicator;
use positioner_hmi::console::{ConsoleController, GoToState, DEFAULT_COMPLETION_DELAY};
use positioner_hmi::health::{LinkHealth, OutcomeKind};
use positioner_hmi::polling::PollingLoop;
use positioner_hmi::state::{DeviceState, StateReader};

const FAST: SimParams = SimParams {
    slew_rate: 1.0e6,
    tolerance: 0.05,
};

fn setup(params: SimParams) -> (PlcCommunicator, ConsoleController, StateReader, SimHandle) {
    let (feedback, commands, reader) = DeviceState::new();
    let client = SimClient::new(PositionerSim::with_params(TagMap::default(), params));
    let handle = client.handle();
    let comm = PlcCommunicator::new(Box::new(client), TagMap::default(), feedback);
    (comm, ConsoleController::new(commands), reader, handle)
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
fn manual_run_reaches_target_and_is_released() {
    let (mut comm, mut console, reader, handle) = setup(FAST);
    console.edit_requested_position(45.0);
    console.go_to();

    for _ in 0..50 {
        comm.run();
        if reader.feedback().motion_complete_reported {
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    let feedback = reader.feedback();
    assert!(feedback.motion_complete_reported);
    assert_relative_eq!(feedback.current_position, 45.0, epsilon = 0.05);
    assert!(handle.with_sim(|s| s.manual_run()));

    let t0 = Instant::now();
    let view = console.tick(t0);
    assert_eq!(view.go_to, GoToState::Settling);
    assert!(view.indicators.complete);
    assert!(!view.indicators.in_progress);

    let view = console.tick(t0 + DEFAULT_COMPLETION_DELAY);
    assert_eq!(view.go_to, GoToState::Idle);
    assert_eq!(view.status, "Motion complete");

    comm.run();
    assert!(!handle.with_sim(|s| s.manual_run()));
}

#[test]
fn complete_indicator_tracks_each_cycle() {
    let (mut comm, mut console, _reader, handle) = setup(FAST);
    handle.with_sim(|s| {
        s.set_current_position(10.0);
        s.request_robot_move(10.0);
    });

    for _ in 0..3 {
        assert!(comm.run().is_completed());
        let view = console.tick(Instant::now());
        assert!(view.indicators.robot_request);
        assert!(view.indicators.complete);
        assert!(!view.indicators.in_progress);
    }

    // At the default slew rate the move cannot finish within one cycle
    let (mut comm, mut console, _reader, handle) = setup(SimParams::default());
    handle.with_sim(|s| s.request_robot_move(90.0));
    comm.run();
    let view = console.tick(Instant::now());
    assert!(view.indicators.in_progress);
    assert!(!view.indicators.complete);
}

#[test]
fn disconnected_cycles_leave_positions_untouched() {
    let (mut comm, _console, reader, handle) = setup(FAST);
    handle.with_sim(|s| {
        s.set_current_position(20.0);
        s.request_robot_move(20.0);
    });
    assert!(comm.run().is_completed());
    let before = reader.feedback();

    handle.set_connected(false);
    handle.with_sim(|s| {
        s.set_current_position(70.0);
        s.request_robot_move(75.0);
    });
    for _ in 0..5 {
        assert_eq!(comm.run().kind(), OutcomeKind::Skipped);
        let now = reader.feedback();
        assert_eq!(now.current_position, before.current_position);
        assert_eq!(now.robot_requested_position, before.robot_requested_position);
        assert_eq!(now.requested_position, before.requested_position);
        assert!(!now.connection_ok);
    }

    handle.set_connected(true);
    assert!(comm.run().is_completed());
    assert_eq!(reader.feedback().robot_requested_position, 75.0);
}

#[test]
fn home_bit_reaches_the_controller_once() {
    let (mut comm, mut console, _reader, handle) = setup(FAST);
    console.home();
    for _ in 0..5 {
        comm.run();
    }
    console.home();
    for _ in 0..3 {
        comm.run();
    }

    let home_writes: Vec<bool> = handle
        .writes()
        .into_iter()
        .filter(|(tag, _)| tag == "test.2")
        .filter_map(|(_, value)| value.as_bool())
        .collect();
    assert_eq!(home_writes.len(), 8);
    assert_eq!(home_writes.iter().filter(|bit| **bit).count(), 2);
    assert!(home_writes[0]);
    assert!(home_writes[5]);
}

#[test]
fn force_complete_masks_and_reveals_controller_report() {
    let (mut comm, mut console, reader, _handle) = setup(SimParams::default());
    console.edit_requested_position(90.0);
    console.go_to();
    comm.run();
    assert!(!reader.snapshot().motion_complete());

    console.set_force_complete(true).unwrap();
    comm.run();
    let view = console.tick(Instant::now());
    assert!(view.indicators.complete);
    assert!(!view.indicators.in_progress);
    assert!(!reader.feedback().motion_complete_reported);

    console.set_force_complete(false).unwrap();
    let view = console.tick(Instant::now());
    assert!(!view.indicators.complete);
}

#[test]
fn polling_survives_failures_and_recovers() {
    let (feedback, _commands, reader) = DeviceState::new();
    let client = SimClient::new(PositionerSim::new(TagMap::default()));
    let handle = client.handle();
    let comm = PlcCommunicator::new(Box::new(client), TagMap::default(), feedback)
        .with_health(LinkHealth::new(5));

    handle.inject_failures(200);
    handle.reject_tag("RobotRequestedPosition", Some(TagStatus::ConnectionFailure));
    let mut polling = PollingLoop::spawn(comm, Duration::from_millis(1), None).unwrap();

    assert!(wait_for(|| reader.feedback().last_outcome == OutcomeKind::Fatal));
    assert!(polling.is_running());

    handle.reject_tag("RobotRequestedPosition", None);
    assert!(wait_for(|| reader.feedback().last_outcome == OutcomeKind::Completed));
    assert!(polling.is_running());
    assert_eq!(reader.feedback().consecutive_failures, 0);

    let comm = polling.shutdown().unwrap();
    assert!(comm.health().totals().fatal > 0);
}

#[test]
fn gateway_end_to_end() {
    let sim = Arc::new(Mutex::new(PositionerSim::new(TagMap::default())));
    sim.lock().unwrap().set_clock(Some(12));
    let mut server = GatewayServer::bind("127.0.0.1:0", Arc::clone(&sim))
        .unwrap()
        .spawn()
        .unwrap();

    let (feedback, commands, reader) = DeviceState::new();
    let client = GatewayClient::new(server.addr()).unwrap();
    let mut comm = PlcCommunicator::new(Box::new(client), TagMap::default(), feedback);
    let mut console = ConsoleController::new(commands);

    console.edit_requested_position(15.0);
    console.go_to();
    assert!(comm.run().is_completed());

    let fb = reader.feedback();
    assert!(fb.connection_ok);
    assert_eq!(fb.heartbeat_seconds, 12);
    {
        let sim = sim.lock().unwrap();
        assert_eq!(sim.heartbeat_ack(), 12);
        assert_eq!(sim.command_position(), 15.0);
        assert!(sim.manual_run());
    }

    server.shutdown();
    let outcome = comm.run();
    assert_eq!(outcome.kind(), OutcomeKind::Skipped);
    assert!(!reader.feedback().connection_ok);
    assert_eq!(reader.feedback().heartbeat_seconds, 12);
}

#[test]
fn write_values_follow_operator_commands() {
    let (mut comm, mut console, _reader, handle) = setup(SimParams::default());
    console.edit_requested_position(-12.5);
    console.go_to();
    comm.run();
    console.stop();
    comm.run();

    let manual: Vec<TagValue> = handle
        .writes()
        .into_iter()
        .filter(|(tag, _)| tag == "test.0")
        .map(|(_, value)| value)
        .collect();
    assert_eq!(manual, vec![TagValue::Bool(true), TagValue::Bool(false)]);
    assert_eq!(handle.with_sim(|s| s.command_position()), -12.5);
}
