//! Positioner operator console.
//!
//! Polls the positioner PLC in the background and runs the operator console
//! in the terminal. Logs go to a file because the terminal belongs to the UI.

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use plc_link::sim::{PositionerSim, SimClient};
use plc_link::TagClient;
use positioner_hmi::args::{LinkArgs, LoopArgs};
use positioner_hmi::communicator::PlcCommunicator;
use positioner_hmi::console::ConsoleController;
use positioner_hmi::health::LinkHealth;
use positioner_hmi::log_dirs::ImageLogDirs;
use positioner_hmi::monitor::{Metrics, MonitorServer};
use positioner_hmi::polling::PollingLoop;
use positioner_hmi::settings::SettingsStore;
use positioner_hmi::state::DeviceState;
use positioner_hmi::tui::{self, ConsoleApp};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Positioner operator console")]
struct Args {
    #[command(flatten)]
    link: LinkArgs,

    #[command(flatten)]
    loops: LoopArgs,

    /// Run against the built-in simulated controller instead of the gateway
    #[arg(long)]
    sim: bool,

    /// Serve /metrics and /status on this address (e.g. 127.0.0.1:9100)
    #[arg(long)]
    monitor_addr: Option<SocketAddr>,

    /// Settings directory (default ~/.positioner_hmi)
    #[arg(long)]
    settings_dir: Option<PathBuf>,

    /// Create a timestamped image log directory under this path at startup
    #[arg(long)]
    image_log_dir: Option<PathBuf>,

    #[arg(long, default_value = "positioner_hmi.log")]
    log_file: PathBuf,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(path: &Path, verbose: bool) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_file, args.verbose)?;

    let settings = match &args.settings_dir {
        Some(path) => SettingsStore::with_path(path.clone()),
        None => SettingsStore::new()?,
    };
    let tags = settings.load_tag_map().context("Failed to load tag map")?;
    let inspection = settings
        .load_inspection()
        .context("Failed to load inspection parameters")?;
    let credentials = settings
        .load_credentials()
        .context("Failed to load access settings")?;
    info!(
        "Settings from {}: slit {:.2}-{:.2} mm, {:.4} mm/px",
        settings.root_path().display(),
        inspection.min_slit_mm,
        inspection.max_slit_mm,
        inspection.mm_per_pixel()
    );

    if let Some(base) = &args.image_log_dir {
        ImageLogDirs::prepare(base, Utc::now())
            .with_context(|| format!("Failed to prepare image logs under {}", base.display()))?;
    }

    let client: Box<dyn TagClient + Send> = if args.sim {
        info!("Using simulated controller");
        Box::new(SimClient::new(PositionerSim::new(tags.clone())))
    } else {
        info!("Using tag gateway at {}:{}", args.link.ip, args.link.port);
        Box::new(args.link.gateway_client()?)
    };

    let (feedback, commands, reader) = DeviceState::new();
    let communicator = PlcCommunicator::new(client, tags, feedback)
        .with_health(LinkHealth::new(args.loops.unreachable_after));

    let metrics = Arc::new(Metrics::new()?);
    let _monitor = args
        .monitor_addr
        .map(|addr| MonitorServer::spawn(addr, Arc::clone(&metrics), reader.clone()))
        .transpose()
        .context("Failed to start monitor server")?;
    let on_cycle = args.monitor_addr.map(|_| metrics.cycle_callback());

    let mut polling = PollingLoop::spawn(communicator, args.loops.poll_period(), on_cycle)
        .context("Failed to start polling thread")?;

    let console = ConsoleController::new(commands)
        .with_completion_delay(args.loops.completion_delay())
        .with_credentials(credentials);
    let mut app = ConsoleApp::new(console);

    let mut terminal = ratatui::init();
    let result = tui::run(&mut terminal, &mut app, args.loops.display_period());
    ratatui::restore();

    polling.shutdown();
    info!("Console closed");
    result.context("Console failed")
}
