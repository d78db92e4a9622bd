//! Observer interface and fan-out registry
//!
//! Consumers implement [`LinkObserver`] for the callbacks they care
//! about; every method has a no-op default, so an observer overrides
//! only what it needs instead of subclassing a client base type.
//!
//! [`ObserverRegistry`] guards the observer list with its own lock and
//! snapshot-copies it before every fan-out, so observers may register
//! and unregister freely from inside callbacks without mutating a list
//! that is being iterated.

use crate::device::PeerDevice;
use crate::transport::ConnectFailure;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Scan and connection lifecycle callbacks
///
/// Callbacks are invoked from internal tasks; implementations should
/// stay short and must not block on peerlink calls.
pub trait LinkObserver: Send + Sync {
    /// A discovery pass is starting on the given transport
    fn on_scan_begin(&self, _transport_id: &str) {}

    /// A discovery pass finished on the given transport
    fn on_scan_end(&self, _transport_id: &str) {}

    /// A device was seen for the first time in this scan lifetime
    fn on_device_found(&self, _device: &PeerDevice) {}

    /// A connection to the device is up and ready for traffic
    fn on_connection_established(&self, _device: &PeerDevice) {}

    /// A connection attempt to the device failed
    fn on_connection_failed(&self, _device: &PeerDevice, _reason: ConnectFailure) {}

    /// A previously established connection went down
    fn on_connection_closed(&self, _device: &PeerDevice) {}
}

/// Thread-safe observer list with copy-before-iterate fan-out
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Mutex<Vec<Arc<dyn LinkObserver>>>,
}

impl ObserverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer
    pub fn register(&self, observer: Arc<dyn LinkObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    /// Unregister a previously registered observer
    ///
    /// Matches by identity; unknown observers are ignored.
    pub fn unregister(&self, observer: &Arc<dyn LinkObserver>) {
        let mut observers = self.observers.lock().unwrap();
        let before = observers.len();
        observers.retain(|o| !Arc::ptr_eq(o, observer));
        if observers.len() == before {
            debug!("unregister: observer not found");
        }
    }

    /// Number of registered observers
    pub fn len(&self) -> usize {
        self.observers.lock().unwrap().len()
    }

    /// Whether no observers are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn LinkObserver>> {
        self.observers.lock().unwrap().clone()
    }
}

// The registry is itself an observer: internal components hand it around
// as the single listener and it fans out to everything registered.
impl LinkObserver for ObserverRegistry {
    fn on_scan_begin(&self, transport_id: &str) {
        for observer in self.snapshot() {
            observer.on_scan_begin(transport_id);
        }
    }

    fn on_scan_end(&self, transport_id: &str) {
        for observer in self.snapshot() {
            observer.on_scan_end(transport_id);
        }
    }

    fn on_device_found(&self, device: &PeerDevice) {
        for observer in self.snapshot() {
            observer.on_device_found(device);
        }
    }

    fn on_connection_established(&self, device: &PeerDevice) {
        for observer in self.snapshot() {
            observer.on_connection_established(device);
        }
    }

    fn on_connection_failed(&self, device: &PeerDevice, reason: ConnectFailure) {
        for observer in self.snapshot() {
            observer.on_connection_failed(device, reason);
        }
    }

    fn on_connection_closed(&self, device: &PeerDevice) {
        for observer in self.snapshot() {
            observer.on_connection_closed(device);
        }
    }
}
