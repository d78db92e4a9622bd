//! TCP socket binding
//!
//! Reaches peers over plain TCP. Discovery probes a configured list of
//! candidate endpoints (manual favorites, provisioned head units) with a
//! short connect timeout; opening a connection hands the socket to a
//! [`StreamBridge`] as a blocking receive/send pair.

use crate::bridge::{RawReceiver, RawSender, StreamBridge, DEFAULT_BUFFER_CAPACITY};
use crate::device::PeerAddress;
use crate::error::Result;
use crate::transport::{ConnectFailure, TransportBinding};
use async_trait::async_trait;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Transport identifier of the TCP binding
pub const TCP_TRANSPORT_ID: &str = "tcp";

/// Default reachability-probe timeout per endpoint
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Default connect timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// TCP binding configuration
#[derive(Debug, Clone)]
pub struct TcpBindingConfig {
    /// Candidate endpoints to probe during discovery
    pub endpoints: Vec<SocketAddr>,

    /// Per-endpoint probe timeout
    pub probe_timeout: Duration,

    /// Connection establishment timeout
    pub connect_timeout: Duration,

    /// Inbound buffer capacity for opened bridges
    pub buffer_capacity: usize,
}

impl Default for TcpBindingConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

/// TCP transport binding
#[derive(Debug)]
pub struct TcpBinding {
    config: TcpBindingConfig,
}

impl TcpBinding {
    /// Create a binding over the configured endpoint list
    pub fn new(config: TcpBindingConfig) -> Self {
        Self { config }
    }

    /// Split a connected socket into blocking receive/send halves
    fn into_channel(
        stream: tokio::net::TcpStream,
    ) -> std::io::Result<(TcpReceiver, TcpSender)> {
        let stream = stream.into_std()?;
        stream.set_nonblocking(false)?;
        let write_half = stream.try_clone()?;
        Ok((TcpReceiver { stream }, TcpSender { stream: write_half }))
    }
}

#[async_trait]
impl TransportBinding for TcpBinding {
    fn transport_id(&self) -> &str {
        TCP_TRANSPORT_ID
    }

    async fn discover(&self) -> Result<Vec<PeerAddress>> {
        let mut reachable = Vec::new();
        for endpoint in &self.config.endpoints {
            match timeout(
                self.config.probe_timeout,
                tokio::net::TcpStream::connect(endpoint),
            )
            .await
            {
                Ok(Ok(_stream)) => {
                    // Probe socket is dropped immediately; the real
                    // connection is opened on request.
                    reachable.push(PeerAddress::new(
                        TCP_TRANSPORT_ID,
                        endpoint.to_string(),
                        endpoint.to_string(),
                    ));
                }
                Ok(Err(e)) => {
                    debug!("probe of {} failed: {}", endpoint, e);
                }
                Err(_) => {
                    debug!("probe of {} timed out", endpoint);
                }
            }
        }
        Ok(reachable)
    }

    async fn open(
        &self,
        address: &PeerAddress,
    ) -> std::result::Result<StreamBridge, ConnectFailure> {
        if address.transport_id != TCP_TRANSPORT_ID {
            warn!("tcp binding asked to open {}", address);
            return Err(ConnectFailure::Unreachable);
        }

        let endpoint: SocketAddr = match address.raw_address.parse() {
            Ok(addr) => addr,
            Err(e) => {
                warn!("bad tcp address {}: {}", address.raw_address, e);
                return Err(ConnectFailure::Unreachable);
            }
        };

        let stream = match timeout(
            self.config.connect_timeout,
            tokio::net::TcpStream::connect(endpoint),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                debug!("{} refused the connection", endpoint);
                return Err(ConnectFailure::Rejected);
            }
            Ok(Err(e)) => {
                debug!("connect to {} failed: {}", endpoint, e);
                return Err(ConnectFailure::Unreachable);
            }
            Err(_) => {
                debug!("connect to {} timed out", endpoint);
                return Err(ConnectFailure::Unreachable);
            }
        };

        let (receiver, sender) = match Self::into_channel(stream) {
            Ok(halves) => halves,
            Err(e) => {
                warn!("failed to split socket for {}: {}", endpoint, e);
                return Err(ConnectFailure::Unreachable);
            }
        };

        debug!("tcp connection to {} established", endpoint);
        Ok(StreamBridge::open(
            Box::new(receiver),
            Box::new(sender),
            self.config.buffer_capacity,
        ))
    }
}

/// Blocking receive half of a TCP socket
struct TcpReceiver {
    stream: std::net::TcpStream,
}

impl RawReceiver for TcpReceiver {
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> i32 {
        if self.stream.set_read_timeout(Some(timeout)).is_err() {
            return -1;
        }
        match self.stream.read(buf) {
            // Orderly remote shutdown reads as end-of-stream.
            Ok(0) => -1,
            Ok(n) => n as i32,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                0
            }
            Err(_) => -1,
        }
    }
}

/// Blocking send half of a TCP socket
struct TcpSender {
    stream: std::net::TcpStream,
}

impl RawSender for TcpSender {
    fn send(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }
}
