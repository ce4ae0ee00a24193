//! Simulated positioner controller served over the tag gateway protocol.
//!
//! Run this, then point the HMI at it:
//!
//! ```text
//! plc_sim --bind 127.0.0.1:44818
//! positioner_hmi --ip 127.0.0.1
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use plc_link::sim::server::GatewayServer;
use plc_link::sim::{PositionerSim, SimParams};
use plc_link::TagMap;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Simulated positioner PLC behind a tag gateway")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:44818")]
    bind: String,

    /// Axis slew rate in degrees per second
    #[arg(long, default_value = "30.0")]
    slew_rate: f64,

    /// Motion-complete tolerance in degrees
    #[arg(long, default_value = "0.05")]
    tolerance: f64,

    /// Issue a robot move request to this position at startup
    #[arg(long)]
    robot_request: Option<f64>,

    /// Stop after this many seconds (runs until killed if omitted)
    #[arg(long)]
    duration: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut sim = PositionerSim::with_params(
        TagMap::default(),
        SimParams {
            slew_rate: args.slew_rate,
            tolerance: args.tolerance,
        },
    );
    if let Some(position) = args.robot_request {
        sim.request_robot_move(position);
    }

    let server = GatewayServer::bind(&args.bind, Arc::new(Mutex::new(sim)))
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    info!("Simulated controller listening on {}", server.local_addr()?);

    let running = Arc::new(AtomicBool::new(true));
    if let Some(secs) = args.duration {
        let flag = Arc::clone(&running);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            flag.store(false, Ordering::Relaxed);
        });
    }

    server.run(running);
    info!("Simulated controller stopped");
    Ok(())
}
