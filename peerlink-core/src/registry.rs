//! Device registry
//!
//! Holds the set of currently-known peer addresses across all transport
//! bindings, deduplicated under the address identity rule and bounded to
//! keep a misbehaving discovery source from growing without limit.

use crate::device::PeerAddress;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Default registry capacity
pub const DEFAULT_REGISTRY_CAPACITY: usize = 10;

/// Insertion-ordered, deduplicated set of discovered addresses
///
/// All mutation and snapshot operations are serialized by a single
/// internal lock; `snapshot` returns a defensive copy so callers never
/// observe the registry mutated mid-iteration.
#[derive(Debug)]
pub struct DeviceRegistry {
    entries: Mutex<Vec<PeerAddress>>,
    capacity: usize,
}

impl DeviceRegistry {
    /// Create a registry with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Record a discovered address
    ///
    /// Returns `true` if the address was newly added. Recording an
    /// address already present is a no-op; recording beyond capacity
    /// drops the address with a warning.
    pub fn record(&self, address: PeerAddress) -> bool {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains(&address) {
            debug!("registry: {} already known", address);
            return false;
        }
        if entries.len() >= self.capacity {
            warn!("registry full ({} entries), dropping {}", self.capacity, address);
            return false;
        }
        debug!("registry: recorded {}", address);
        entries.push(address);
        true
    }

    /// Snapshot the known addresses in insertion order
    pub fn snapshot(&self) -> Vec<PeerAddress> {
        self.entries.lock().unwrap().clone()
    }

    /// Remove and return the oldest address on the given transport
    pub fn take_next_matching(&self, transport_id: &str) -> Option<PeerAddress> {
        let mut entries = self.entries.lock().unwrap();
        let index = entries.iter().position(|a| a.transport_id == transport_id)?;
        Some(entries.remove(index))
    }

    /// Discard all known addresses
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Number of known addresses
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY_CAPACITY)
    }
}
