//! Gateway protocol server backed by a [`PositionerSim`].
//!
//! Lets the HMI run end to end against the simulator over real TCP, using
//! the same [`GatewayClient`](crate::GatewayClient) it uses in production.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{lock, PositionerSim};
use crate::gateway::protocol::{encode_err, encode_read_ok, Request};
use crate::tag::TagStatus;

/// How often idle loops re-check the shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Read timeout on client sockets, bounds shutdown latency.
const CLIENT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// TCP server answering gateway requests from a shared simulator.
pub struct GatewayServer {
    listener: TcpListener,
    sim: Arc<Mutex<PositionerSim>>,
}

impl GatewayServer {
    /// Bind the server. Use port 0 to pick a free port.
    pub fn bind<A: ToSocketAddrs>(addr: A, sim: Arc<Mutex<PositionerSim>>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener, sim })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and serve clients until `running` is cleared.
    ///
    /// Each client gets its own thread. All client threads are joined before
    /// this returns, so their sockets are closed once it does.
    pub fn run(&self, running: Arc<AtomicBool>) {
        let mut clients: Vec<JoinHandle<()>> = Vec::new();

        while running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    info!("Gateway client connected: {addr}");
                    let sim = Arc::clone(&self.sim);
                    let running = Arc::clone(&running);
                    let spawned = thread::Builder::new()
                        .name(format!("gateway-{addr}"))
                        .spawn(move || {
                            if let Err(e) = serve_client(stream, sim, running) {
                                warn!("Gateway client {addr} error: {e}");
                            }
                            info!("Gateway client disconnected: {addr}");
                        });
                    match spawned {
                        Ok(handle) => clients.push(handle),
                        Err(e) => warn!("Failed to spawn client thread: {e}"),
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => warn!("Accept error: {e}"),
            }
            clients.retain(|h| !h.is_finished());
        }

        for handle in clients {
            let _ = handle.join();
        }
    }

    /// Run the server on a background thread.
    pub fn spawn(self) -> std::io::Result<ServerHandle> {
        let addr = self.local_addr()?;
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("gateway-accept".to_string())
            .spawn(move || self.run(flag))?;
        Ok(ServerHandle {
            addr,
            running,
            thread: Some(thread),
        })
    }
}

/// Running server; stops and joins on [`shutdown`](Self::shutdown) or drop.
pub struct ServerHandle {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting, close every client socket, and wait for the threads.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serve_client(
    stream: TcpStream,
    sim: Arc<Mutex<PositionerSim>>,
    running: Arc<AtomicBool>,
) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(CLIENT_READ_TIMEOUT))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    while running.load(Ordering::Relaxed) {
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) if !line.ends_with('\n') => continue,
            Ok(_) => {
                let answer = handle_line(&sim, &line);
                line.clear();
                writer.write_all(answer.as_bytes())?;
                writer.write_all(b"\n")?;
                writer.flush()?;
            }
            // Partial lines stay in `line` until the rest arrives
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn handle_line(sim: &Mutex<PositionerSim>, line: &str) -> String {
    let request = match Request::parse(line) {
        Ok(request) => request,
        Err(e) => {
            debug!("Rejecting request {:?}: {e}", line.trim());
            return encode_err(&TagStatus::Other("Invalid request".to_string()));
        }
    };

    let mut sim = lock(sim);
    sim.advance(Instant::now());
    match request {
        Request::Read { tag } => {
            let response = sim.read_tag(&tag);
            match response.value {
                Some(value) if response.status.is_success() => encode_read_ok(value),
                _ => encode_err(&response.status),
            }
        }
        Request::Write { tag, value } => match sim.write_tag(&tag, value) {
            Ok(()) => "OK".to_string(),
            Err(status) => encode_err(&status),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag_map::TagMap;

    fn shared_sim() -> Arc<Mutex<PositionerSim>> {
        Arc::new(Mutex::new(PositionerSim::new(TagMap::default())))
    }

    #[test]
    fn test_handle_line_read_and_write() {
        let sim = shared_sim();
        assert_eq!(handle_line(&sim, "WRITE CommandPos REAL 15\n"), "OK");
        assert_eq!(handle_line(&sim, "READ CommandPos\n"), "OK REAL 15");
        assert_eq!(handle_line(&sim, "READ PositionerMotionOk\n"), "OK BOOL 0");
    }

    #[test]
    fn test_handle_line_errors() {
        let sim = shared_sim();
        assert_eq!(
            handle_line(&sim, "READ Missing.Tag\n"),
            "ERR Path segment error"
        );
        assert_eq!(
            handle_line(&sim, "WRITE Positioner.CurrentPosition REAL 1\n"),
            "ERR Service not supported"
        );
        assert_eq!(handle_line(&sim, "PING\n"), "ERR Invalid request");
    }
}
