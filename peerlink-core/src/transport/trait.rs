//! Transport binding trait
//!
//! Defines the common capability interface implemented once per
//! transport. A binding knows how to enumerate reachable peers and how
//! to open a byte-stream bridge to one of them; scan scheduling lives in
//! [`crate::transport::DeviceScanner`] and session lifecycle in
//! [`crate::connection::ConnectionManager`].

use crate::bridge::StreamBridge;
use crate::device::PeerAddress;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

/// Why a connection attempt failed
///
/// Returned as a value from [`TransportBinding::open`]; connect failures
/// are expected outcomes, not control-flow exceptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectFailure {
    /// The transport could not reach the device at all
    #[error("device unreachable")]
    Unreachable,

    /// The device was reached but refused the handshake
    #[error("connection rejected by peer")]
    Rejected,
}

/// Common interface over one transport channel type
#[async_trait]
pub trait TransportBinding: Send + Sync + Debug {
    /// Stable identifier of this transport (e.g. `"tcp"`, `"bulk"`)
    fn transport_id(&self) -> &str;

    /// Enumerate the peers currently reachable over this transport
    ///
    /// Invoked by the scan driver on each poll pass; results are diffed
    /// against the previously known set there, so implementations simply
    /// report everything they can currently see.
    async fn discover(&self) -> Result<Vec<PeerAddress>>;

    /// Open a connection to the given address
    ///
    /// On success the returned bridge is live and its reader task is
    /// running. On failure the [`ConnectFailure`] distinguishes an
    /// unreachable device from a rejected handshake.
    async fn open(&self, address: &PeerAddress)
        -> std::result::Result<StreamBridge, ConnectFailure>;
}
