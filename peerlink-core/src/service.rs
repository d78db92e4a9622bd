//! Link service
//!
//! The explicitly constructed composition root: wires scanners into the
//! registry, the registry into the auto-connect loop and the loop into
//! the connection orchestrator, and exposes the surface an embedding
//! client drives. Ownership is explicit; there is no process-wide
//! instance and lifecycle runs through `init` / `terminate`.

use crate::autoconnect::{AutoConnectConfig, AutoConnectService, ReadyHook};
use crate::connection::events::{LinkObserver, ObserverRegistry};
use crate::connection::manager::{ConnectionManager, SessionState};
use crate::device::PeerDevice;
use crate::registry::{DeviceRegistry, DEFAULT_REGISTRY_CAPACITY};
use crate::transport::{DeviceScanner, ScanConfig, TransportBinding};
use std::sync::Arc;
use tracing::{debug, info};

/// Link service configuration
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Scan driver settings, shared by every binding's scanner
    pub scan: ScanConfig,

    /// Auto-connect loop settings
    pub autoconnect: AutoConnectConfig,

    /// Whether `init` starts the auto-connect loop
    pub autoconnect_enabled: bool,

    /// Registry capacity
    pub registry_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            autoconnect: AutoConnectConfig::default(),
            autoconnect_enabled: true,
            registry_capacity: DEFAULT_REGISTRY_CAPACITY,
        }
    }
}

/// Feeds scan results into the registry before they fan out
struct RegistryRecorder {
    registry: Arc<DeviceRegistry>,
}

impl LinkObserver for RegistryRecorder {
    fn on_device_found(&self, device: &PeerDevice) {
        self.registry.record(device.to_peer_address());
    }
}

/// Composition root over bindings, registry, orchestrator and
/// auto-connect
pub struct LinkService {
    registry: Arc<DeviceRegistry>,
    manager: Arc<ConnectionManager>,
    autoconnect: Arc<AutoConnectService>,
    scanners: Vec<DeviceScanner>,
    observers: Arc<ObserverRegistry>,
    config: LinkConfig,
}

impl LinkService {
    /// Build a service over the given transport bindings
    pub fn new(bindings: Vec<Arc<dyn TransportBinding>>, config: LinkConfig) -> Self {
        Self::with_ready_hook(bindings, config, None)
    }

    /// Build a service with an optional host-readiness gate for the
    /// auto-connect loop
    pub fn with_ready_hook(
        bindings: Vec<Arc<dyn TransportBinding>>,
        config: LinkConfig,
        ready: Option<ReadyHook>,
    ) -> Self {
        let observers = Arc::new(ObserverRegistry::new());
        let registry = Arc::new(DeviceRegistry::new(config.registry_capacity));

        let manager = Arc::new(ConnectionManager::new(bindings.clone(), observers.clone()));
        let autoconnect = Arc::new(AutoConnectService::with_ready_hook(
            manager.clone(),
            registry.clone(),
            config.autoconnect.clone(),
            ready,
        ));

        // Internal observers: the recorder feeds the registry, the
        // auto-connect service tracks connection outcomes.
        observers.register(Arc::new(RegistryRecorder {
            registry: registry.clone(),
        }));
        observers.register(autoconnect.clone());

        let scanners = bindings
            .iter()
            .map(|binding| DeviceScanner::new(binding.clone(), config.scan.clone()))
            .collect();

        Self {
            registry,
            manager,
            autoconnect,
            scanners,
            observers,
            config,
        }
    }

    /// Start scanning and (when enabled) the auto-connect loop
    pub fn init(&self) {
        info!("link service starting");
        self.start_scan();
        if self.config.autoconnect_enabled {
            self.autoconnect.start();
        }
    }

    /// Stop all background work and tear down any live session
    pub async fn terminate(&self) {
        info!("link service stopping");
        self.autoconnect.stop();
        self.stop_scan();
        self.manager.disconnect().await;
    }

    /// Start every binding's scanner
    ///
    /// Returns `true` if all scanners started; a scanner already
    /// running counts as not started.
    pub fn start_scan(&self) -> bool {
        let observer: Arc<dyn LinkObserver> = self.observers.clone();
        let mut all = true;
        for scanner in &self.scanners {
            if !scanner.start_scan(observer.clone()) {
                all = false;
            }
        }
        all
    }

    /// Stop every binding's scanner (idempotent)
    pub fn stop_scan(&self) {
        for scanner in &self.scanners {
            scanner.stop_scan();
        }
    }

    /// Request a connection to a specific device
    ///
    /// Used for manual connections from a persisted or typed token;
    /// the auto-connect loop uses the same orchestrator underneath.
    pub async fn request_connect(&self, device: &PeerDevice) -> bool {
        debug!("manual connection request for {}", device.name());
        self.manager.request_connect(device).await
    }

    /// Tear down the live session, if any
    pub async fn disconnect(&self) {
        self.manager.disconnect().await;
    }

    /// Whether a session is currently established
    pub async fn is_connected(&self) -> bool {
        self.manager.state().await == SessionState::Connected
    }

    /// Register an external observer
    pub fn register_observer(&self, observer: Arc<dyn LinkObserver>) {
        self.observers.register(observer);
    }

    /// Unregister an external observer
    pub fn unregister_observer(&self, observer: &Arc<dyn LinkObserver>) {
        self.observers.unregister(observer);
    }

    /// The device registry
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// The connection orchestrator
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// The auto-connect service
    pub fn autoconnect(&self) -> &Arc<AutoConnectService> {
        &self.autoconnect
    }
}

impl std::fmt::Debug for LinkService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkService")
            .field("scanners", &self.scanners)
            .field("autoconnect_enabled", &self.config.autoconnect_enabled)
            .finish()
    }
}
