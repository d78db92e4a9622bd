//! Peerlink core
//!
//! Transport-agnostic peer discovery and connection lifecycle
//! management for projection clients: pluggable transport bindings,
//! a deduplicated device registry, an at-most-one-live-session
//! connection orchestrator, a supervising auto-connect loop and a
//! byte-stream bridge that turns blocking platform I/O into a buffered,
//! pollable stream for the upper protocol layer.

pub mod autoconnect;
pub mod bridge;
pub mod connection;
pub mod device;
pub mod registry;
pub mod service;
pub mod transport;

mod error;

pub use autoconnect::{AutoConnectConfig, AutoConnectService, ReadyHook};
pub use bridge::{BridgeEvent, RawReceiver, RawSender, StreamBridge, DEFAULT_BUFFER_CAPACITY};
pub use connection::{ConnectionManager, LinkObserver, ObserverRegistry, SessionState};
pub use device::{PeerAddress, PeerDevice};
pub use error::{LinkError, Result};
pub use registry::{DeviceRegistry, DEFAULT_REGISTRY_CAPACITY};
pub use service::{LinkConfig, LinkService};
pub use transport::{
    BulkBinding, BulkChannel, BulkEndpointInfo, BulkHost, ConnectFailure, DeviceScanner,
    ScanConfig, TcpBinding, TcpBindingConfig, TransportBinding, BULK_TRANSPORT_ID,
    DEFAULT_SCAN_POLL_INTERVAL, TCP_TRANSPORT_ID,
};
