//! TCP client for the controller tag gateway.
//!
//! The controller itself speaks EtherNet/IP; the HMI does not implement that
//! stack. Instead it talks to a tag gateway that sits next to the controller
//! and forwards named reads and writes. The gateway speaks the line protocol
//! described in [`protocol`].
//!
//! # Connection Handling
//!
//! The client connects lazily and reconnects on its own: when the socket is
//! down, the next [`read`](GatewayClient::read) or
//! [`write`](GatewayClient::write) makes one connection attempt. Any
//! transport failure (I/O error, timeout, peer closing the socket) drops the
//! socket, so [`is_connected`](TagClient::is_connected) reports `false` until
//! a later attempt succeeds. An `ERR` answer from the gateway is a normal
//! reply and leaves the connection up.
//!
//! # Example
//!
//! ```no_run
//! use plc_link::{GatewayClient, TagClient, TagValue};
//!
//! let mut plc = GatewayClient::connect_default_port("192.168.1.12")?;
//!
//! let pos = plc.read_f64("Positioner.CurrentPosition")?;
//! println!("Positioner at {pos:.1} deg");
//!
//! plc.write("CommandPos", TagValue::Real(90.0))?;
//! # Ok::<(), plc_link::LinkError>(())
//! ```

pub mod protocol;

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::client::TagClient;
use crate::error::{LinkError, LinkResult};
use crate::tag::{TagResponse, TagValue};
use protocol::{parse_read_response, parse_write_response, validate_tag, Request};

/// Default TCP port of the tag gateway (the EtherNet/IP explicit messaging port).
pub const DEFAULT_PORT: u16 = 44818;

/// Controller address used by the positioner cell.
pub const DEFAULT_CONTROLLER_IP: &str = "192.168.1.12";

/// Default timeout for a single request/response exchange.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default timeout for establishing the TCP connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Open socket, split into a buffered reader and a writer half.
struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

/// Tag client talking to a gateway over TCP.
pub struct GatewayClient {
    addr: SocketAddr,
    conn: Option<Connection>,
    timeout: Duration,
    connect_timeout: Duration,
}

impl GatewayClient {
    /// Create a client for the given address without connecting.
    ///
    /// The first read or write opens the connection.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ConnectionFailed`] if the address does not resolve.
    pub fn new<A: ToSocketAddrs>(addr: A) -> LinkResult<Self> {
        let addr = addr
            .to_socket_addrs()
            .map_err(|e| LinkError::ConnectionFailed(format!("Failed to resolve address: {e}")))?
            .next()
            .ok_or_else(|| LinkError::ConnectionFailed("Address resolved to nothing".into()))?;

        Ok(Self {
            addr,
            conn: None,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    /// Create a client and connect immediately.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> LinkResult<Self> {
        let mut client = Self::new(addr)?;
        client.ensure_connected()?;
        Ok(client)
    }

    /// Connect to a gateway at the given IP using the default port.
    pub fn connect_default_port(ip: &str) -> LinkResult<Self> {
        Self::connect(format!("{ip}:{DEFAULT_PORT}"))
    }

    /// Set the timeout for a request/response exchange.
    ///
    /// Applies to the current socket and to future reconnects.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        if let Some(conn) = &self.conn {
            let _ = conn.writer.set_read_timeout(Some(timeout));
            let _ = conn.writer.set_write_timeout(Some(timeout));
        }
    }

    /// Set the timeout for establishing a connection.
    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.connect_timeout = timeout;
    }

    /// Address of the gateway.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Close the socket. The next request reconnects.
    pub fn disconnect(&mut self) {
        if self.conn.take().is_some() {
            debug!("Disconnected from gateway {}", self.addr);
        }
    }

    fn ensure_connected(&mut self) -> LinkResult<&mut Connection> {
        if self.conn.is_none() {
            let stream = TcpStream::connect_timeout(&self.addr, self.connect_timeout)
                .map_err(|e| LinkError::ConnectionFailed(format!("{}: {e}", self.addr)))?;
            stream.set_read_timeout(Some(self.timeout))?;
            stream.set_write_timeout(Some(self.timeout))?;
            stream.set_nodelay(true)?;

            let reader = BufReader::new(stream.try_clone()?);
            debug!("Connected to tag gateway at {}", self.addr);
            self.conn = Some(Connection {
                reader,
                writer: stream,
            });
        }

        self.conn
            .as_mut()
            .ok_or_else(|| LinkError::NotConnected(self.addr.to_string()))
    }

    /// Send one request line and read one answer line.
    ///
    /// Drops the connection on any transport failure.
    fn exchange(&mut self, request: &Request) -> LinkResult<String> {
        let result = self.try_exchange(request);
        if let Err(e) = &result {
            if e.is_transport() {
                warn!("Gateway {} exchange failed: {e}", self.addr);
                self.conn = None;
            }
        }
        result
    }

    fn try_exchange(&mut self, request: &Request) -> LinkResult<String> {
        let conn = self.ensure_connected()?;

        let mut msg = request.encode();
        trace!("Gateway send: {msg:?}");
        msg.push('\n');
        conn.writer.write_all(msg.as_bytes())?;
        conn.writer.flush()?;

        let mut line = String::new();
        match conn.reader.read_line(&mut line) {
            Ok(0) => Err(LinkError::ConnectionFailed(
                "Connection closed by gateway".into(),
            )),
            Ok(_) => {
                trace!("Gateway recv: {line:?}");
                Ok(line)
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Err(LinkError::Timeout)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl TagClient for GatewayClient {
    fn read(&mut self, tag: &str) -> LinkResult<TagResponse> {
        validate_tag(tag)?;
        let line = self.exchange(&Request::Read {
            tag: tag.to_string(),
        })?;
        parse_read_response(tag, &line)
    }

    fn write(&mut self, tag: &str, value: TagValue) -> LinkResult<()> {
        validate_tag(tag)?;
        let line = self.exchange(&Request::Write {
            tag: tag.to_string(),
            value,
        })?;
        parse_write_response(tag, &line)
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn endpoint(&self) -> String {
        self.addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_new_does_not_connect() {
        let client = GatewayClient::new("127.0.0.1:1").unwrap();
        assert!(!client.is_connected());
        assert_eq!(client.endpoint(), "127.0.0.1:1");
    }

    #[test]
    fn test_refused_connection_reports_failure() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut client = GatewayClient::new(("127.0.0.1", port)).unwrap();
        let err = client.read("CommandPos").unwrap_err();
        assert!(err.is_transport(), "{err}");
        assert!(!client.is_connected());
    }

    #[test]
    fn test_invalid_tag_rejected_before_io() {
        let mut client = GatewayClient::new("127.0.0.1:1").unwrap();
        assert!(matches!(
            client.read("two words"),
            Err(LinkError::InvalidTag(_))
        ));
    }
}
