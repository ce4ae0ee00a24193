//! Operator console and PLC polling bridge for the positioner cell.
//!
//! Two loops share one [`state::DeviceState`]:
//!
//! - the polling loop ([`polling::PollingLoop`]) runs a heartbeat, read and
//!   write cycle against the controller every 100 ms through a
//!   [`communicator::PlcCommunicator`]
//! - the display loop ([`tui`]) ticks a [`console::ConsoleController`] every
//!   10 ms, draws the result and turns key presses into operator commands
//!
//! The loops never call each other. Controller feedback is written only by
//! the polling loop and operator commands only by the console.

pub mod access;
pub mod args;
pub mod communicator;
pub mod console;
pub mod health;
pub mod log_dirs;
pub mod monitor;
pub mod polling;
pub mod settings;
pub mod state;
pub mod timer;
pub mod tui;
