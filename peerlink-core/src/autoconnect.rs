//! Auto-connect supervision
//!
//! A single supervising task that keeps trying to establish a session
//! with some discovered peer on the preferred transport: it pulls the
//! next registry candidate, issues a connection request, waits for the
//! outcome, and resumes whenever an established connection drops. The
//! loop blocks on a notification from the three connection callbacks
//! (with a bounded poll as a safety net) rather than busy-waiting, and
//! retries indefinitely; any give-up policy belongs to the caller.

use crate::connection::events::LinkObserver;
use crate::connection::manager::{ConnectionManager, SessionState};
use crate::device::PeerDevice;
use crate::registry::DeviceRegistry;
use crate::transport::ConnectFailure;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Optional host-readiness gate consulted before each connect request
pub type ReadyHook = Box<dyn Fn() -> bool + Send + Sync>;

/// Auto-connect configuration
#[derive(Debug, Clone)]
pub struct AutoConnectConfig {
    /// Transport whose candidates the loop will connect to
    pub preferred_transport: String,

    /// Safety-net poll interval while waiting for notifications
    pub poll_interval: Duration,

    /// Pause after a resolved attempt before trying the next candidate
    pub retry_pause: Duration,
}

impl Default for AutoConnectConfig {
    fn default() -> Self {
        Self {
            preferred_transport: crate::transport::TCP_TRANSPORT_ID.to_string(),
            poll_interval: Duration::from_millis(1000),
            retry_pause: Duration::from_millis(1000),
        }
    }
}

/// Requested/connected device tracking
#[derive(Default)]
struct ReconnectState {
    requested: Option<PeerDevice>,
    connected: Option<PeerDevice>,
}

struct AutoShared {
    state: Mutex<ReconnectState>,
    wake: Notify,
    cancelled: AtomicBool,
    ready: Option<ReadyHook>,
}

impl AutoShared {
    fn host_ready(&self) -> bool {
        self.ready.as_ref().map(|hook| hook()).unwrap_or(true)
    }

    /// Sleep until woken by a notification, the timeout, or cancellation
    async fn wait(&self, timeout: Duration) {
        let notified = self.wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep(timeout) => {}
        }
    }
}

/// Supervising reconnect loop
///
/// Register the service as a [`LinkObserver`] so the connection
/// callbacks reach it; they mutate the requested/connected pair under
/// one lock and wake the loop immediately.
pub struct AutoConnectService {
    manager: Arc<ConnectionManager>,
    registry: Arc<DeviceRegistry>,
    config: AutoConnectConfig,
    shared: Arc<AutoShared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AutoConnectService {
    /// Create a service without a readiness gate
    pub fn new(
        manager: Arc<ConnectionManager>,
        registry: Arc<DeviceRegistry>,
        config: AutoConnectConfig,
    ) -> Self {
        Self::with_ready_hook(manager, registry, config, None)
    }

    /// Create a service with an optional readiness gate
    ///
    /// When present, the hook is consulted before every connect request;
    /// a `false` holds the loop without consuming candidates.
    pub fn with_ready_hook(
        manager: Arc<ConnectionManager>,
        registry: Arc<DeviceRegistry>,
        config: AutoConnectConfig,
        ready: Option<ReadyHook>,
    ) -> Self {
        Self {
            manager,
            registry,
            config,
            shared: Arc::new(AutoShared {
                state: Mutex::new(ReconnectState::default()),
                wake: Notify::new(),
                cancelled: AtomicBool::new(false),
                ready,
            }),
            task: Mutex::new(None),
        }
    }

    /// Start the supervising task
    ///
    /// Returns `false` if the loop is already running.
    pub fn start(&self) -> bool {
        let mut task = self.task.lock().unwrap();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            warn!("auto-connect already running, taking no action");
            return false;
        }

        self.shared.cancelled.store(false, Ordering::SeqCst);
        *task = Some(tokio::spawn(Self::run(
            self.manager.clone(),
            self.registry.clone(),
            self.config.clone(),
            self.shared.clone(),
        )));
        true
    }

    /// Stop the supervising task
    ///
    /// The loop observes cancellation at its next checkpoint, including
    /// mid-sleep. Idempotent.
    pub fn stop(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        self.shared.wake.notify_waiters();
        self.task.lock().unwrap().take();
    }

    /// Device currently awaiting connection resolution
    pub fn requested_device(&self) -> Option<PeerDevice> {
        self.shared.state.lock().unwrap().requested.clone()
    }

    /// Device the loop considers connected
    pub fn connected_device(&self) -> Option<PeerDevice> {
        self.shared.state.lock().unwrap().connected.clone()
    }

    async fn run(
        manager: Arc<ConnectionManager>,
        registry: Arc<DeviceRegistry>,
        config: AutoConnectConfig,
        shared: Arc<AutoShared>,
    ) {
        info!(
            "auto-connect started (preferred transport: {})",
            config.preferred_transport
        );

        loop {
            if shared.cancelled.load(Ordering::SeqCst) {
                break;
            }

            // Hold while a request is unresolved or a connection is up.
            let busy = {
                let mut state = shared.state.lock().unwrap();
                if let Some(requested) = state.requested.clone() {
                    if state.connected.as_ref() == Some(&requested) {
                        debug!("connection to {} confirmed", requested.name());
                        state.requested = None;
                    }
                    true
                } else {
                    state.connected.is_some()
                }
            };
            if busy {
                shared.wait(config.poll_interval).await;
                continue;
            }

            // A session established outside this loop also holds it.
            if manager.state().await != SessionState::Idle {
                shared.wait(config.poll_interval).await;
                continue;
            }

            if !shared.host_ready() {
                debug!("host not ready, auto-connect holding");
                shared.wait(config.poll_interval).await;
                continue;
            }

            let Some(candidate) = registry.take_next_matching(&config.preferred_transport)
            else {
                shared.wait(config.poll_interval).await;
                continue;
            };

            let device = PeerDevice::from_address(&candidate);
            shared.state.lock().unwrap().requested = Some(device.clone());

            info!("auto-connect: requesting connection to {}", device.name());
            if !manager.request_connect(&device).await {
                warn!(
                    "auto-connect: connection request refused for {}",
                    device.name()
                );
                {
                    let mut state = shared.state.lock().unwrap();
                    if state.requested.as_ref() == Some(&device) {
                        state.requested = None;
                    }
                }
                registry.record(device.to_peer_address());
            }

            // Pace the next attempt; an established/failed notification
            // wakes the wait early.
            shared.wait(config.retry_pause).await;
        }

        info!("auto-connect stopped");
    }
}

impl LinkObserver for AutoConnectService {
    fn on_connection_established(&self, device: &PeerDevice) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.requested.as_ref() == Some(device) {
                state.connected = Some(device.clone());
            } else {
                warn!(
                    "peer device mismatch: connection established with {} while {} was requested",
                    device.name(),
                    describe(&state.requested)
                );
            }
        }
        self.shared.wake.notify_waiters();
    }

    fn on_connection_failed(&self, device: &PeerDevice, _reason: ConnectFailure) {
        let matched = {
            let mut state = self.shared.state.lock().unwrap();
            if state.requested.as_ref() == Some(device) {
                state.requested = None;
                true
            } else {
                warn!(
                    "peer device mismatch: connection failed for {} while {} was requested",
                    device.name(),
                    describe(&state.requested)
                );
                false
            }
        };
        if matched {
            // Scanners report each address only once, so put the device
            // back for the next attempt.
            self.registry.record(device.to_peer_address());
        }
        self.shared.wake.notify_waiters();
    }

    fn on_connection_closed(&self, device: &PeerDevice) {
        let matched = {
            let mut state = self.shared.state.lock().unwrap();
            if state.connected.as_ref() == Some(device) {
                state.connected = None;
                true
            } else {
                warn!(
                    "peer device mismatch: connection closed for {} while {} was connected",
                    device.name(),
                    describe(&state.connected)
                );
                false
            }
        };
        if matched {
            self.registry.record(device.to_peer_address());
        }
        self.shared.wake.notify_waiters();
    }
}

fn describe(device: &Option<PeerDevice>) -> String {
    device
        .as_ref()
        .map(|d| d.name().to_string())
        .unwrap_or_else(|| "nothing".to_string())
}

impl std::fmt::Debug for AutoConnectService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoConnectService")
            .field("preferred_transport", &self.config.preferred_transport)
            .finish()
    }
}
