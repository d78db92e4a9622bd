//! Device scan driver
//!
//! One scanner per transport binding. The scan task polls
//! [`TransportBinding::discover`], diffs each pass against the set of
//! addresses already seen and reports every newly appeared address to
//! the observer exactly once per scan lifetime.

use crate::connection::events::LinkObserver;
use crate::device::{PeerAddress, PeerDevice};
use crate::transport::TransportBinding;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Default pause between discovery passes
pub const DEFAULT_SCAN_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Scan driver configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Pause between discovery passes
    pub poll_interval: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_SCAN_POLL_INTERVAL,
        }
    }
}

/// Polling scan driver for one transport binding
///
/// At most one scan task (and therefore one observer registration) is
/// live at a time; `start_scan` refuses a second start and `stop_scan`
/// is an idempotent no-op when nothing is running.
pub struct DeviceScanner {
    binding: Arc<dyn TransportBinding>,
    config: ScanConfig,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl DeviceScanner {
    /// Create a scanner for the given binding
    pub fn new(binding: Arc<dyn TransportBinding>, config: ScanConfig) -> Self {
        Self {
            binding,
            config,
            stop_tx: Mutex::new(None),
        }
    }

    /// Start scanning, reporting discoveries to `observer`
    ///
    /// Returns `false` without side effects if a scan is already
    /// running. The scan task starts with an empty known set, so every
    /// currently visible address is reported once more after a restart.
    pub fn start_scan(&self, observer: Arc<dyn LinkObserver>) -> bool {
        let mut stop_tx = self.stop_tx.lock().unwrap();
        if stop_tx.is_some() {
            warn!(
                "start_scan: scan already running on {}, taking no action",
                self.binding.transport_id()
            );
            return false;
        }

        let (tx, rx) = watch::channel(false);
        *stop_tx = Some(tx);

        let binding = self.binding.clone();
        let poll_interval = self.config.poll_interval;
        tokio::spawn(Self::scan_task(binding, observer, poll_interval, rx));
        true
    }

    /// Stop the scan task
    ///
    /// Idempotent: calling with no scan running logs and does nothing.
    /// The task observes the signal at its next await point, well inside
    /// one poll interval.
    pub fn stop_scan(&self) {
        let mut stop_tx = self.stop_tx.lock().unwrap();
        match stop_tx.take() {
            Some(tx) => {
                let _ = tx.send(true);
            }
            None => {
                debug!(
                    "stop_scan: no scan running on {}, taking no action",
                    self.binding.transport_id()
                );
            }
        }
    }

    /// Whether a scan task is currently live
    pub fn is_scanning(&self) -> bool {
        self.stop_tx.lock().unwrap().is_some()
    }

    /// Identifier of the scanned transport
    pub fn transport_id(&self) -> &str {
        self.binding.transport_id()
    }

    async fn scan_task(
        binding: Arc<dyn TransportBinding>,
        observer: Arc<dyn LinkObserver>,
        poll_interval: Duration,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        let transport_id = binding.transport_id().to_string();
        info!("scan task started on {}", transport_id);
        let mut known: HashSet<PeerAddress> = HashSet::new();

        loop {
            if *stop_rx.borrow() {
                break;
            }

            observer.on_scan_begin(&transport_id);
            match binding.discover().await {
                Ok(addresses) => {
                    for address in addresses {
                        // Within a pass, results reach the observer in
                        // discovery order; across passes each address is
                        // reported only on first sight.
                        if known.insert(address.clone()) {
                            let device = PeerDevice::from_address(&address);
                            debug!("found {} on {}", device.name(), transport_id);
                            observer.on_device_found(&device);
                        }
                    }
                }
                Err(e) => {
                    warn!("discovery pass failed on {}: {}", transport_id, e);
                }
            }
            observer.on_scan_end(&transport_id);

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("scan task stopped on {}", transport_id);
    }
}

impl std::fmt::Debug for DeviceScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceScanner")
            .field("transport_id", &self.binding.transport_id())
            .field("scanning", &self.is_scanning())
            .finish()
    }
}
