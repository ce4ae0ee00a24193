//! Connects to the tag gateway and reads every positioner tag once.
//!
//! Useful for checking the tag map against a live controller before starting
//! the HMI.

use anyhow::{Context, Result};
use clap::Parser;
use plc_link::{GatewayClient, TagClient, TagMap, TagRole, DEFAULT_CONTROLLER_IP, DEFAULT_PORT};
use strum::IntoEnumIterator;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Read all positioner tags from the controller once")]
struct Args {
    /// Controller / gateway IP address
    #[arg(long, default_value = DEFAULT_CONTROLLER_IP)]
    ip: String,

    /// Gateway TCP port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// JSON tag map overriding the default tag names
    #[arg(long)]
    tag_map: Option<std::path::PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let tags = match &args.tag_map {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => TagMap::default(),
    };

    info!("Connecting to tag gateway at {}:{}...", args.ip, args.port);
    let mut plc = GatewayClient::connect((args.ip.as_str(), args.port))?;

    for role in TagRole::iter() {
        let tag = tags.name(role);
        match plc.read(tag) {
            Ok(resp) => match resp.value {
                Some(value) if resp.status.is_success() => {
                    info!("{role:<24} {tag:<40} = {value}")
                }
                _ => warn!("{role:<24} {tag:<40} status: {}", resp.status),
            },
            Err(e) => warn!("{role:<24} {tag:<40} failed: {e}"),
        }
    }

    info!("Socket connected: {}", plc.is_connected());
    Ok(())
}
