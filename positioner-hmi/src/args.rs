//! Command line argument groups shared by the console binary.

use std::time::Duration;

use clap::Args;
use plc_link::{GatewayClient, LinkResult, DEFAULT_CONTROLLER_IP, DEFAULT_PORT};

use crate::health::DEFAULT_UNREACHABLE_AFTER;

/// Controller connection.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Controller / tag gateway IP address
    #[arg(long, default_value = DEFAULT_CONTROLLER_IP)]
    pub ip: String,

    /// Tag gateway TCP port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Read/write timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub timeout_ms: u64,

    /// Connect timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub connect_timeout_ms: u64,
}

impl LinkArgs {
    /// Gateway client for these settings. Does not connect yet.
    pub fn gateway_client(&self) -> LinkResult<GatewayClient> {
        let mut client = GatewayClient::new((self.ip.as_str(), self.port))?;
        client.set_timeout(Duration::from_millis(self.timeout_ms));
        client.set_connect_timeout(Duration::from_millis(self.connect_timeout_ms));
        Ok(client)
    }
}

/// Loop timing.
#[derive(Args, Debug, Clone)]
pub struct LoopArgs {
    /// Polling loop period in milliseconds
    #[arg(long, default_value_t = 100)]
    pub poll_ms: u64,

    /// Display loop period in milliseconds
    #[arg(long, default_value_t = 10)]
    pub display_ms: u64,

    /// Delay after motion complete before a manual run is released
    #[arg(long, default_value_t = 1000)]
    pub completion_ms: u64,

    /// Consecutive failed cycles before the controller counts as unreachable
    #[arg(long, default_value_t = DEFAULT_UNREACHABLE_AFTER)]
    pub unreachable_after: u32,
}

impl LoopArgs {
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn display_period(&self) -> Duration {
        Duration::from_millis(self.display_ms)
    }

    pub fn completion_delay(&self) -> Duration {
        Duration::from_millis(self.completion_ms)
    }
}
