//! Link service integration tests
//!
//! Exercise the full cycle over an in-process mock transport — scan,
//! discover, auto-connect, remote drop, reconnect — and a manual
//! connection over a loopback TCP peer.

use async_trait::async_trait;
use peerlink_core::{
    AutoConnectConfig, ConnectFailure, LinkConfig, LinkObserver, LinkService, PeerAddress,
    PeerDevice, RawReceiver, RawSender, Result, ScanConfig, StreamBridge, TcpBinding,
    TcpBindingConfig, TransportBinding,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const MOCK_TRANSPORT: &str = "mock";

/// Receive half whose link liveness the test controls
struct FlaggedReceiver {
    alive: Arc<AtomicBool>,
}

impl RawReceiver for FlaggedReceiver {
    fn receive(&mut self, _buf: &mut [u8], timeout: Duration) -> i32 {
        std::thread::sleep(timeout.min(Duration::from_millis(10)));
        if self.alive.load(Ordering::SeqCst) {
            0
        } else {
            -1
        }
    }
}

struct NullSender;

impl RawSender for NullSender {
    fn send(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(buf.len())
    }
}

/// Transport whose discovery results and link liveness are scripted
#[derive(Debug, Default)]
struct MockBinding {
    visible: Mutex<Vec<PeerAddress>>,
    opens: AtomicUsize,
    live_links: Mutex<Vec<Arc<AtomicBool>>>,
}

impl MockBinding {
    fn show(&self, raw: &str) {
        self.visible
            .lock()
            .unwrap()
            .push(PeerAddress::new(MOCK_TRANSPORT, raw, raw));
    }

    fn drop_links(&self) {
        for link in self.live_links.lock().unwrap().iter() {
            link.store(false, Ordering::SeqCst);
        }
    }

    fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportBinding for MockBinding {
    fn transport_id(&self) -> &str {
        MOCK_TRANSPORT
    }

    async fn discover(&self) -> Result<Vec<PeerAddress>> {
        Ok(self.visible.lock().unwrap().clone())
    }

    async fn open(
        &self,
        _address: &PeerAddress,
    ) -> std::result::Result<StreamBridge, ConnectFailure> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let alive = Arc::new(AtomicBool::new(true));
        self.live_links.lock().unwrap().push(alive.clone());
        Ok(StreamBridge::open(
            Box::new(FlaggedReceiver { alive }),
            Box::new(NullSender),
            1024,
        ))
    }
}

#[derive(Default)]
struct Recorder {
    found: Mutex<Vec<String>>,
    scans_ended: AtomicUsize,
}

impl LinkObserver for Recorder {
    fn on_scan_end(&self, _transport_id: &str) {
        self.scans_ended.fetch_add(1, Ordering::SeqCst);
    }

    fn on_device_found(&self, device: &PeerDevice) {
        self.found.lock().unwrap().push(device.address().to_string());
    }
}

fn fast_config(preferred: &str) -> LinkConfig {
    LinkConfig {
        scan: ScanConfig {
            poll_interval: Duration::from_millis(20),
        },
        autoconnect: AutoConnectConfig {
            preferred_transport: preferred.to_string(),
            poll_interval: Duration::from_millis(20),
            retry_pause: Duration::from_millis(20),
        },
        ..Default::default()
    }
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

async fn wait_for_connected(what: &str, service: &LinkService, expect: bool) {
    for _ in 0..300 {
        if service.is_connected().await == expect {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn test_autoconnect_discovers_connects_and_reconnects() {
    let binding = Arc::new(MockBinding::default());
    binding.show("HU-1");

    let service = LinkService::new(vec![binding.clone()], fast_config(MOCK_TRANSPORT));
    let recorder = Arc::new(Recorder::default());
    service.register_observer(recorder.clone());

    service.init();

    // Scan finds the head unit and auto-connect establishes a session.
    wait_for_connected("initial connection", &service, true).await;
    assert_eq!(binding.open_count(), 1);
    assert_eq!(
        service.autoconnect().connected_device(),
        Some(PeerDevice::new("HU-1", MOCK_TRANSPORT, "HU-1"))
    );

    // The device is reported exactly once even after several passes.
    wait_until("several scan passes", || {
        recorder.scans_ended.load(Ordering::SeqCst) >= 3
    })
    .await;
    assert_eq!(recorder.found.lock().unwrap().clone(), vec!["HU-1"]);

    // Remote drop: the loop notices and connects again.
    binding.drop_links();
    wait_until("reconnection", || binding.open_count() >= 2).await;
    wait_for_connected("session restored", &service, true).await;

    service.terminate().await;
    wait_for_connected("teardown", &service, false).await;
}

#[tokio::test]
async fn test_manual_tcp_connect_round_trip() {
    // Echo peer.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 64];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if stream.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let binding: Arc<dyn TransportBinding> =
        Arc::new(TcpBinding::new(TcpBindingConfig::default()));
    let config = LinkConfig {
        autoconnect_enabled: false,
        ..Default::default()
    };
    let service = LinkService::new(vec![binding], config);

    // Manual entry path: a typed token, no scanning involved.
    let device: PeerDevice = format!("tcp://{}", addr).parse().unwrap();
    assert!(service.request_connect(&device).await);
    assert!(service.is_connected().await);

    let bridge = service.manager().active_bridge().await.unwrap();
    bridge.write(b"ping");

    let mut collected = Vec::new();
    while collected.len() < 4 {
        bridge.readable().await;
        let mut buf = [0u8; 16];
        let n = bridge.read(&mut buf);
        collected.extend_from_slice(&buf[..n]);
    }
    assert_eq!(collected, b"ping");

    service.terminate().await;
    wait_for_connected("disconnect", &service, false).await;
}

#[tokio::test]
async fn test_connect_busy_while_autoconnect_holds_session() {
    let binding = Arc::new(MockBinding::default());
    binding.show("HU-1");

    let service = LinkService::new(vec![binding.clone()], fast_config(MOCK_TRANSPORT));
    service.init();
    wait_for_connected("connection", &service, true).await;

    // While HU-1 holds the only session slot, a different device is
    // refused outright.
    let other = PeerDevice::new("HU-2", MOCK_TRANSPORT, "HU-2");
    assert!(!service.request_connect(&other).await);
    assert_eq!(binding.open_count(), 1);

    service.terminate().await;
}
