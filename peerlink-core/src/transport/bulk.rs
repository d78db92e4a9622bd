//! Bulk-transfer binding
//!
//! Channel type for accessory-style links where the hosting platform
//! owns endpoint enumeration and raw I/O (USB accessory endpoints and
//! similar). The platform implements [`BulkHost`]; this binding adapts
//! it to the common [`TransportBinding`] interface and wraps opened
//! endpoints in a [`StreamBridge`].

use crate::bridge::{RawReceiver, RawSender, StreamBridge, DEFAULT_BUFFER_CAPACITY};
use crate::device::PeerAddress;
use crate::error::Result;
use crate::transport::{ConnectFailure, TransportBinding};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, warn};

/// Transport identifier of the bulk binding
pub const BULK_TRANSPORT_ID: &str = "bulk";

/// One attached bulk endpoint as reported by the platform
#[derive(Debug, Clone)]
pub struct BulkEndpointInfo {
    /// Stable endpoint serial; becomes the raw peer address
    pub serial: String,

    /// Human-readable label (product name, model)
    pub label: String,
}

/// Raw I/O pair for one opened endpoint
pub struct BulkChannel {
    pub receiver: Box<dyn RawReceiver>,
    pub sender: Box<dyn RawSender>,
}

/// Platform-side bulk endpoint access
///
/// The only platform-specific seam of this transport: enumeration of
/// attached endpoints and the blocking receive/send pair behind
/// [`BulkChannel`]. Both calls may block briefly and are invoked off
/// the async runtime.
pub trait BulkHost: Send + Sync + Debug {
    /// List the currently attached endpoints
    fn enumerate(&self) -> Vec<BulkEndpointInfo>;

    /// Open an endpoint by serial and hand over its raw channel
    fn open_endpoint(&self, serial: &str) -> std::result::Result<BulkChannel, ConnectFailure>;
}

/// Bulk transport binding over an injected platform host
#[derive(Debug, Clone)]
pub struct BulkBinding {
    host: Arc<dyn BulkHost>,
    buffer_capacity: usize,
}

impl BulkBinding {
    /// Create a binding over the given platform host
    pub fn new(host: Arc<dyn BulkHost>) -> Self {
        Self {
            host,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }

    /// Override the inbound buffer capacity for opened bridges
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }
}

#[async_trait]
impl TransportBinding for BulkBinding {
    fn transport_id(&self) -> &str {
        BULK_TRANSPORT_ID
    }

    async fn discover(&self) -> Result<Vec<PeerAddress>> {
        let host = self.host.clone();
        let endpoints = tokio::task::spawn_blocking(move || host.enumerate())
            .await
            .map_err(|e| std::io::Error::other(e))?;

        Ok(endpoints
            .into_iter()
            .map(|ep| PeerAddress::new(BULK_TRANSPORT_ID, ep.serial, ep.label))
            .collect())
    }

    async fn open(
        &self,
        address: &PeerAddress,
    ) -> std::result::Result<StreamBridge, ConnectFailure> {
        if address.transport_id != BULK_TRANSPORT_ID {
            warn!("bulk binding asked to open {}", address);
            return Err(ConnectFailure::Unreachable);
        }

        let host = self.host.clone();
        let serial = address.raw_address.clone();
        let channel = match tokio::task::spawn_blocking(move || host.open_endpoint(&serial)).await {
            Ok(result) => result?,
            Err(e) => {
                warn!("bulk open task failed: {}", e);
                return Err(ConnectFailure::Unreachable);
            }
        };

        debug!("bulk endpoint {} attached", address.raw_address);
        Ok(StreamBridge::open(
            channel.receiver,
            channel.sender,
            self.buffer_capacity,
        ))
    }
}
