//! Connection orchestrator
//!
//! Drives the `Idle -> Connecting -> Connected` session state machine
//! over the registered transport bindings and enforces the core
//! invariant: at most one live session per manager instance, so
//! overlapping connection attempts can never leak transport handles.

use crate::bridge::{BridgeEvent, StreamBridge};
use crate::connection::events::{LinkObserver, ObserverRegistry};
use crate::device::PeerDevice;
use crate::transport::{ConnectFailure, TransportBinding};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// State of the session slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session; connection requests are accepted
    Idle,

    /// A connection attempt is in flight
    Connecting,

    /// A session is live and carrying traffic
    Connected,
}

/// The single session slot
struct Session {
    state: SessionState,
    device: Option<PeerDevice>,
    bridge: Option<Arc<StreamBridge>>,
    /// Incremented per established session so a stale teardown cannot
    /// clobber a newer session occupying the slot
    seq: u64,
}

/// Connection orchestrator over a set of transport bindings
pub struct ConnectionManager {
    bindings: HashMap<String, Arc<dyn TransportBinding>>,
    observers: Arc<ObserverRegistry>,
    session: Arc<Mutex<Session>>,
}

impl ConnectionManager {
    /// Create a manager over the given bindings
    pub fn new(bindings: Vec<Arc<dyn TransportBinding>>, observers: Arc<ObserverRegistry>) -> Self {
        let bindings = bindings
            .into_iter()
            .map(|b| (b.transport_id().to_string(), b))
            .collect();

        Self {
            bindings,
            observers,
            session: Arc::new(Mutex::new(Session {
                state: SessionState::Idle,
                device: None,
                bridge: None,
                seq: 0,
            })),
        }
    }

    /// Request a connection to the given device
    ///
    /// Returns `false` and does nothing if a session to a *different*
    /// device is connecting or connected; a repeated request for the
    /// device already occupying the slot is a successful no-op. Once the
    /// request is accepted the outcome is reported through the observer
    /// registry as exactly one established or failed notification.
    pub async fn request_connect(&self, device: &PeerDevice) -> bool {
        {
            let mut session = self.session.lock().await;
            match session.state {
                SessionState::Idle => {
                    // Reserve the slot before any transport call so no
                    // two tasks ever observe overlapping Connecting states.
                    session.state = SessionState::Connecting;
                    session.device = Some(device.clone());
                }
                state => {
                    if session.device.as_ref() == Some(device) {
                        debug!("request_connect: {} is already {:?}", device.name(), state);
                        return true;
                    }
                    warn!(
                        "request_connect: refused {} while busy with {}",
                        device.name(),
                        session
                            .device
                            .as_ref()
                            .map(|d| d.name().to_string())
                            .unwrap_or_default()
                    );
                    return false;
                }
            }
        }

        let Some(binding) = self.bindings.get(device.transport_id()).cloned() else {
            warn!("no binding registered for transport {}", device.transport_id());
            self.finish_failed(device, ConnectFailure::Unreachable).await;
            return true;
        };

        info!(
            "connecting to {} over {}",
            device.name(),
            device.transport_id()
        );

        match binding.open(&device.to_peer_address()).await {
            Ok(bridge) => {
                let bridge = Arc::new(bridge);
                let events = bridge.take_events();

                let seq = {
                    let mut session = self.session.lock().await;
                    session.state = SessionState::Connected;
                    session.bridge = Some(bridge.clone());
                    session.seq += 1;
                    session.seq
                };

                info!("connection to {} established", device.name());
                self.observers.on_connection_established(device);

                if let Some(events) = events {
                    self.spawn_session_monitor(device.clone(), seq, events);
                }
                true
            }
            Err(reason) => {
                self.finish_failed(device, reason).await;
                true
            }
        }
    }

    /// Tear down the live session
    ///
    /// Valid from `Connected`; a no-op otherwise. The closed
    /// notification is emitted once the bridge reports its teardown.
    pub async fn disconnect(&self) {
        let bridge = {
            let session = self.session.lock().await;
            if session.state != SessionState::Connected {
                debug!("disconnect: no live session");
                return;
            }
            session.bridge.clone()
        };

        if let Some(bridge) = bridge {
            bridge.close();
        }
    }

    /// Current session state
    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state
    }

    /// Device occupying the session slot, if any
    pub async fn current_device(&self) -> Option<PeerDevice> {
        self.session.lock().await.device.clone()
    }

    /// Live byte-stream bridge for the upper protocol layer
    pub async fn active_bridge(&self) -> Option<Arc<StreamBridge>> {
        let session = self.session.lock().await;
        if session.state == SessionState::Connected {
            session.bridge.clone()
        } else {
            None
        }
    }

    /// Authorize a device for connection
    ///
    /// Extension point for transports that need a credential exchange;
    /// none of the built-in bindings do, so this only checks that the
    /// device's transport is known.
    pub fn authorize_device(&self, device: &PeerDevice, _auth_key: &str) -> bool {
        self.bindings.contains_key(device.transport_id())
    }

    /// Revoke a device authorization
    pub fn deauthorize_device(&self, device: &PeerDevice) -> bool {
        self.bindings.contains_key(device.transport_id())
    }

    /// Reset the slot after a failed attempt and notify once
    async fn finish_failed(&self, device: &PeerDevice, reason: ConnectFailure) {
        {
            let mut session = self.session.lock().await;
            session.state = SessionState::Idle;
            session.device = None;
            session.bridge = None;
        }
        warn!("connection to {} failed: {}", device.name(), reason);
        self.observers.on_connection_failed(device, reason);
    }

    /// Watch a session's bridge and clear the slot when it closes
    fn spawn_session_monitor(
        &self,
        device: PeerDevice,
        seq: u64,
        mut events: tokio::sync::mpsc::UnboundedReceiver<BridgeEvent>,
    ) {
        let session_ref = self.session.clone();
        let observers = self.observers.clone();

        tokio::spawn(async move {
            // The bridge delivers exactly one Closed event per session,
            // so this emits exactly one closed notification.
            match events.recv().await {
                Some(BridgeEvent::Closed) | None => {
                    {
                        let mut session = session_ref.lock().await;
                        if session.seq == seq {
                            session.state = SessionState::Idle;
                            session.device = None;
                            session.bridge = None;
                        } else {
                            debug!(
                                "stale teardown for {} ignored, slot was reused",
                                device.name()
                            );
                        }
                    }
                    info!("connection to {} closed", device.name());
                    observers.on_connection_closed(&device);
                }
            }
        });
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("transports", &self.bindings.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{RawReceiver, RawSender};
    use crate::device::PeerAddress;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct IdleReceiver;

    impl RawReceiver for IdleReceiver {
        fn receive(&mut self, _buf: &mut [u8], timeout: Duration) -> i32 {
            std::thread::sleep(timeout);
            0
        }
    }

    struct NullSender;

    impl RawSender for NullSender {
        fn send(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }
    }

    /// Binding whose open() takes a configurable time and either
    /// succeeds with an idle bridge or fails with the given reason
    #[derive(Debug)]
    struct MockBinding {
        delay: Duration,
        failure: Option<ConnectFailure>,
    }

    #[async_trait]
    impl TransportBinding for MockBinding {
        fn transport_id(&self) -> &str {
            "mock"
        }

        async fn discover(&self) -> Result<Vec<PeerAddress>> {
            Ok(Vec::new())
        }

        async fn open(
            &self,
            _address: &PeerAddress,
        ) -> std::result::Result<StreamBridge, ConnectFailure> {
            tokio::time::sleep(self.delay).await;
            match self.failure {
                Some(reason) => Err(reason),
                None => Ok(StreamBridge::open(
                    Box::new(IdleReceiver),
                    Box::new(NullSender),
                    64,
                )),
            }
        }
    }

    #[derive(Default)]
    struct EventRecorder {
        events: StdMutex<Vec<String>>,
    }

    impl EventRecorder {
        fn recorded(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl LinkObserver for EventRecorder {
        fn on_connection_established(&self, device: &PeerDevice) {
            self.events
                .lock()
                .unwrap()
                .push(format!("established:{}", device.name()));
        }

        fn on_connection_failed(&self, device: &PeerDevice, reason: ConnectFailure) {
            self.events
                .lock()
                .unwrap()
                .push(format!("failed:{}:{}", device.name(), reason));
        }

        fn on_connection_closed(&self, device: &PeerDevice) {
            self.events
                .lock()
                .unwrap()
                .push(format!("closed:{}", device.name()));
        }
    }

    fn manager_with(
        binding: MockBinding,
    ) -> (Arc<ConnectionManager>, Arc<EventRecorder>) {
        let observers = Arc::new(ObserverRegistry::new());
        let recorder = Arc::new(EventRecorder::default());
        observers.register(recorder.clone());
        let manager = Arc::new(ConnectionManager::new(
            vec![Arc::new(binding)],
            observers,
        ));
        (manager, recorder)
    }

    fn device(name: &str) -> PeerDevice {
        PeerDevice::new(name, "mock", name)
    }

    #[tokio::test]
    async fn test_second_request_refused_while_first_in_flight() {
        let (manager, _) = manager_with(MockBinding {
            delay: Duration::from_millis(200),
            failure: None,
        });

        let first = device("d1");
        let mgr = manager.clone();
        let d1 = first.clone();
        let attempt = tokio::spawn(async move { mgr.request_connect(&d1).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.state().await, SessionState::Connecting);

        // A different device must be refused; the in-flight device
        // keeps the slot.
        assert!(!manager.request_connect(&device("d2")).await);
        assert_eq!(manager.current_device().await, Some(first.clone()));

        assert!(attempt.await.unwrap());
        assert_eq!(manager.state().await, SessionState::Connected);
        assert_eq!(manager.current_device().await, Some(first));

        manager.disconnect().await;
    }

    #[tokio::test]
    async fn test_failed_attempt_returns_slot_to_idle() {
        let (manager, recorder) = manager_with(MockBinding {
            delay: Duration::from_millis(10),
            failure: Some(ConnectFailure::Rejected),
        });

        assert!(manager.request_connect(&device("d1")).await);
        assert_eq!(manager.state().await, SessionState::Idle);
        assert_eq!(
            recorder.recorded(),
            vec!["failed:d1:connection rejected by peer"]
        );

        // The slot accepts a new request after the failure.
        assert!(manager.request_connect(&device("d2")).await);
    }

    #[tokio::test]
    async fn test_disconnect_emits_single_closed_notification() {
        let (manager, recorder) = manager_with(MockBinding {
            delay: Duration::from_millis(10),
            failure: None,
        });

        assert!(manager.request_connect(&device("d1")).await);
        assert_eq!(manager.state().await, SessionState::Connected);
        assert!(manager.active_bridge().await.is_some());

        manager.disconnect().await;
        // Second disconnect races the monitor's teardown; both are safe.
        manager.disconnect().await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(manager.state().await, SessionState::Idle);
        assert_eq!(
            recorder.recorded(),
            vec!["established:d1".to_string(), "closed:d1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_disconnect_from_idle_is_noop() {
        let (manager, recorder) = manager_with(MockBinding {
            delay: Duration::from_millis(10),
            failure: None,
        });

        manager.disconnect().await;
        assert_eq!(manager.state().await, SessionState::Idle);
        assert!(recorder.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_transport_fails_cleanly() {
        let (manager, recorder) = manager_with(MockBinding {
            delay: Duration::from_millis(10),
            failure: None,
        });

        let foreign = PeerDevice::new("phone", "serial", "COM3");
        assert!(manager.request_connect(&foreign).await);
        assert_eq!(manager.state().await, SessionState::Idle);
        assert_eq!(recorder.recorded(), vec!["failed:phone:device unreachable"]);
    }

    #[tokio::test]
    async fn test_authorize_is_pass_through() {
        let (manager, _) = manager_with(MockBinding {
            delay: Duration::from_millis(1),
            failure: None,
        });

        assert!(manager.authorize_device(&device("d1"), "unused-key"));
        assert!(manager.deauthorize_device(&device("d1")));
        assert!(!manager.authorize_device(&PeerDevice::new("x", "serial", "COM3"), ""));
    }
}
