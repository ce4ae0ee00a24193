//! Controller tag interface for the positioner HMI.
//!
//! The positioner is driven by a PLC that exposes named tags (positions,
//! request bits, a wall-clock heartbeat). This crate provides the pieces the
//! HMI needs to talk to it:
//!
//! - [`TagValue`], [`TagStatus`], [`TagResponse`] - typed tag data
//! - [`TagClient`] - the read/write seam the polling loop is written against
//! - [`GatewayClient`] - TCP client for a line-oriented tag gateway
//! - [`TagMap`] - which controller tag backs which positioner signal
//!
//! # Features
//!
//! - `sim` - in-process simulated positioner controller ([`sim::PositionerSim`])
//!   plus a gateway server so the HMI can run without hardware

pub mod client;
pub mod error;
pub mod gateway;
pub mod tag;
pub mod tag_map;

#[cfg(feature = "sim")]
pub mod sim;

pub use client::TagClient;
pub use error::{LinkError, LinkResult};
pub use gateway::{GatewayClient, DEFAULT_CONTROLLER_IP, DEFAULT_PORT};
pub use tag::{TagKind, TagResponse, TagStatus, TagValue};
pub use tag_map::{TagMap, TagRole};
