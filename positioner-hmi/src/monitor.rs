//! Monitoring endpoint: Prometheus metrics and a JSON status snapshot.
//!
//! The HTTP server runs on its own small tokio runtime so neither the
//! polling thread nor the display loop ever waits on a scrape.
//!
//! - `GET /metrics`: Prometheus text exposition
//! - `GET /status`: current Device State as JSON

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, Gauge, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::health::{CycleOutcome, OutcomeKind};
use crate::polling::CycleCallback;
use crate::state::{DeviceSnapshot, MotionPhase, StateReader};

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Metrics error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metrics are not valid UTF-8")]
    Encoding,
}

/// Prometheus metrics for the polling loop and Device State.
pub struct Metrics {
    registry: Registry,
    cycles: IntCounterVec,
    consecutive_failures: IntGauge,
    connection_ok: IntGauge,
    heartbeat_seconds: IntGauge,
    current_position: Gauge,
    motion_complete: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, MonitorError> {
        let registry = Registry::new();

        let cycles = IntCounterVec::new(
            Opts::new("plc_poll_cycles_total", "Polling cycles by outcome"),
            &["outcome"],
        )?;
        let consecutive_failures = IntGauge::new(
            "plc_consecutive_failures",
            "Polling cycles failed back to back",
        )?;
        let connection_ok =
            IntGauge::new("plc_connection_ok", "Transport socket connected (0/1)")?;
        let heartbeat_seconds =
            IntGauge::new("plc_heartbeat_seconds", "Last controller wall clock seconds")?;
        let current_position =
            Gauge::new("positioner_current_position", "Positioner angle in degrees")?;
        let motion_complete = IntGauge::new(
            "positioner_motion_complete",
            "Effective motion complete flag (0/1)",
        )?;

        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(consecutive_failures.clone()))?;
        registry.register(Box::new(connection_ok.clone()))?;
        registry.register(Box::new(heartbeat_seconds.clone()))?;
        registry.register(Box::new(current_position.clone()))?;
        registry.register(Box::new(motion_complete.clone()))?;

        Ok(Self {
            registry,
            cycles,
            consecutive_failures,
            connection_ok,
            heartbeat_seconds,
            current_position,
            motion_complete,
        })
    }

    pub fn record_cycle(&self, outcome: &CycleOutcome) {
        let label = match outcome.kind() {
            OutcomeKind::NotRun => return,
            OutcomeKind::Completed => "completed",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::Transient => "transient",
            OutcomeKind::Fatal => "fatal",
        };
        self.cycles.with_label_values(&[label]).inc();
    }

    /// Refresh gauges from a snapshot.
    pub fn observe(&self, snapshot: &DeviceSnapshot) {
        let feedback = &snapshot.feedback;
        self.consecutive_failures
            .set(i64::from(feedback.consecutive_failures));
        self.connection_ok.set(i64::from(feedback.connection_ok));
        self.heartbeat_seconds.set(feedback.heartbeat_seconds);
        self.current_position.set(feedback.current_position);
        self.motion_complete
            .set(i64::from(snapshot.motion_complete()));
    }

    pub fn encode(&self) -> Result<String, MonitorError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|_| MonitorError::Encoding)
    }

    /// Polling loop callback that counts every cycle outcome.
    pub fn cycle_callback(self: &Arc<Self>) -> CycleCallback {
        let metrics = Arc::clone(self);
        Box::new(move |outcome| metrics.record_cycle(outcome))
    }
}

/// Body of `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub snapshot: DeviceSnapshot,
    pub motion_complete: bool,
    pub in_progress: bool,
    pub phase: MotionPhase,
    pub home_pending: bool,
}

impl From<DeviceSnapshot> for StatusReport {
    fn from(snapshot: DeviceSnapshot) -> Self {
        Self {
            motion_complete: snapshot.motion_complete(),
            in_progress: snapshot.in_progress(),
            phase: snapshot.phase(),
            home_pending: snapshot.home_pending(),
            snapshot,
        }
    }
}

#[derive(Clone)]
struct MonitorState {
    metrics: Arc<Metrics>,
    state: StateReader,
}

pub fn router(metrics: Arc<Metrics>, state: StateReader) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/status", get(status_handler))
        .with_state(MonitorState { metrics, state })
}

async fn metrics_handler(State(monitor): State<MonitorState>) -> Response {
    monitor.metrics.observe(&monitor.state.snapshot());
    match monitor.metrics.encode() {
        Ok(text) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], text).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn status_handler(State(monitor): State<MonitorState>) -> Json<StatusReport> {
    Json(StatusReport::from(monitor.state.snapshot()))
}

/// Running monitor server. Stops on drop.
pub struct MonitorServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    runtime: Option<tokio::runtime::Runtime>,
}

impl MonitorServer {
    /// Bind `addr` and serve on a dedicated runtime thread.
    pub fn spawn(addr: SocketAddr, metrics: Arc<Metrics>, state: StateReader) -> Result<Self, MonitorError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("monitor")
            .enable_all()
            .build()?;

        let listener = runtime.block_on(tokio::net::TcpListener::bind(addr))?;
        let addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel::<()>();
        let app = router(metrics, state);

        runtime.spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!("Monitor server error: {e}");
            }
        });
        info!("Monitor listening on http://{addr}");

        Ok(Self {
            addr,
            shutdown: Some(tx),
            runtime: Some(runtime),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(1));
        }
    }
}

impl Drop for MonitorServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
