//! Byte-stream bridge
//!
//! Adapts a transport's blocking I/O primitives into a buffered,
//! pollable byte stream for the upper protocol layer. A dedicated
//! blocking reader task pumps the platform receive call into a
//! fixed-capacity buffer; `read` copies out without blocking and
//! callers poll or await [`StreamBridge::readable`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

/// Default inbound buffer capacity
pub const DEFAULT_BUFFER_CAPACITY: usize = 16 * 1024;

/// How long a single blocking receive may wait before re-checking state
const RECEIVE_POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// Backoff while the inbound buffer is full and the consumer is slow
const CONGESTION_BACKOFF: Duration = Duration::from_millis(10);

/// Blocking receive primitive supplied by the hosting platform
///
/// Return value follows the platform convention: negative is a hard
/// error, zero means no data arrived within the timeout, positive is
/// the number of bytes read into the buffer.
pub trait RawReceiver: Send + 'static {
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> i32;
}

/// Blocking send primitive supplied by the hosting platform
pub trait RawSender: Send + 'static {
    fn send(&mut self, buf: &[u8]) -> std::io::Result<usize>;
}

/// Events emitted by a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEvent {
    /// The connection is down; emitted exactly once per bridge
    Closed,
}

/// Fixed-capacity compacting inbound buffer
///
/// `take` copies out the oldest bytes and shifts the remainder to the
/// front, so `available` never exceeds the capacity chosen at creation.
struct ReadBuffer {
    data: Vec<u8>,
    len: usize,
}

impl ReadBuffer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            len: 0,
        }
    }

    fn available(&self) -> usize {
        self.len
    }

    fn free(&self) -> usize {
        self.data.len() - self.len
    }

    /// Append up to the free space; returns bytes accepted
    fn append(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.free());
        self.data[self.len..self.len + n].copy_from_slice(&src[..n]);
        self.len += n;
        n
    }

    /// Copy out up to `dst.len()` bytes and compact the remainder
    fn take(&mut self, dst: &mut [u8]) -> usize {
        let n = self.len.min(dst.len());
        if n == 0 {
            return 0;
        }
        dst[..n].copy_from_slice(&self.data[..n]);
        self.data.copy_within(n..self.len, 0);
        self.len -= n;
        n
    }

    fn discard(&mut self) {
        self.len = 0;
    }
}

struct BridgeShared {
    buffer: Mutex<ReadBuffer>,
    readable: Notify,
    closed: AtomicBool,
    event_tx: mpsc::UnboundedSender<BridgeEvent>,
}

impl BridgeShared {
    /// Tear down once; every later call is a no-op
    ///
    /// Safe from any thread, including the reader task's own error
    /// path, and emits the single `Closed` event on the first call.
    fn shut_down(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("bridge already closed");
            return;
        }
        self.buffer.lock().unwrap().discard();
        let _ = self.event_tx.send(BridgeEvent::Closed);
        // Wake pollers so they observe the closed state promptly.
        self.readable.notify_waiters();
    }
}

/// Buffered byte stream over a pair of blocking platform primitives
///
/// Reads are non-blocking and writes are forwarded on the caller's
/// thread; write errors are logged and close the bridge rather than
/// surfacing across the bridge boundary.
pub struct StreamBridge {
    shared: Arc<BridgeShared>,
    sender: Mutex<Box<dyn RawSender>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<BridgeEvent>>>,
}

impl StreamBridge {
    /// Open a bridge and start its reader task
    ///
    /// Must be called from within a tokio runtime; the reader runs on
    /// the blocking pool and exits when the bridge closes or the
    /// receiver reports a hard error.
    pub fn open(
        receiver: Box<dyn RawReceiver>,
        sender: Box<dyn RawSender>,
        capacity: usize,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(BridgeShared {
            buffer: Mutex::new(ReadBuffer::with_capacity(capacity)),
            readable: Notify::new(),
            closed: AtomicBool::new(false),
            event_tx,
        });

        let reader_shared = shared.clone();
        tokio::task::spawn_blocking(move || Self::reader_loop(receiver, reader_shared));

        Self {
            shared,
            sender: Mutex::new(sender),
            events: Mutex::new(Some(event_rx)),
        }
    }

    /// Open with the default buffer capacity
    pub fn open_default(receiver: Box<dyn RawReceiver>, sender: Box<dyn RawSender>) -> Self {
        Self::open(receiver, sender, DEFAULT_BUFFER_CAPACITY)
    }

    fn reader_loop(mut receiver: Box<dyn RawReceiver>, shared: Arc<BridgeShared>) {
        debug!("bridge reader task started");
        let mut scratch = vec![0u8; DEFAULT_BUFFER_CAPACITY];

        while !shared.closed.load(Ordering::SeqCst) {
            let free = shared.buffer.lock().unwrap().free();

            if free == 0 {
                // Consumer is slow; give it a moment and re-signal so it
                // drains the backlog.
                std::thread::sleep(CONGESTION_BACKOFF);
                if shared.closed.load(Ordering::SeqCst) {
                    break;
                }
                shared.readable.notify_waiters();
                continue;
            }

            if scratch.len() < free {
                scratch.resize(free, 0);
            }
            let n = receiver.receive(&mut scratch[..free], RECEIVE_POLL_TIMEOUT);

            if n > 0 {
                // A close that raced the blocking receive wins: drop the
                // late data so no data-available signal follows close().
                {
                    let mut buffer = shared.buffer.lock().unwrap();
                    if shared.closed.load(Ordering::SeqCst) {
                        break;
                    }
                    buffer.append(&scratch[..n as usize]);
                }
                shared.readable.notify_waiters();
            } else if n < 0 {
                warn!("bridge receive error ({}), closing", n);
                break;
            }
            // n == 0: timeout with no data, loop re-checks the closed flag
        }

        shared.shut_down();
        debug!("bridge reader task finished");
    }

    /// Copy up to `buf.len()` buffered bytes out without blocking
    ///
    /// Returns the number of bytes copied, zero if none are available.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        self.shared.buffer.lock().unwrap().take(buf)
    }

    /// Bytes currently buffered
    pub fn bytes_available(&self) -> usize {
        self.shared.buffer.lock().unwrap().available()
    }

    /// Wait until data is available or the bridge closes
    pub async fn readable(&self) {
        let notified = self.shared.readable.notified();
        tokio::pin!(notified);
        // Register before checking so a signal that lands between the
        // check and the await is not lost.
        notified.as_mut().enable();
        if self.bytes_available() > 0 || !self.is_ready() {
            return;
        }
        notified.await;
    }

    /// Forward outbound bytes to the transport
    ///
    /// Write errors are fatal to the session: they are logged and the
    /// bridge closes. Nothing is reported back to the caller.
    pub fn write(&self, data: &[u8]) {
        if !self.is_ready() {
            debug!("write on closed bridge dropped ({} bytes)", data.len());
            return;
        }

        let mut sender = self.sender.lock().unwrap();
        let mut written = 0;
        while written < data.len() {
            match sender.send(&data[written..]) {
                Ok(0) => {
                    warn!("bridge send made no progress, closing");
                    drop(sender);
                    self.close();
                    return;
                }
                Ok(n) => written += n,
                Err(e) => {
                    warn!("bridge send error ({}), closing", e);
                    drop(sender);
                    self.close();
                    return;
                }
            }
        }
    }

    /// Whether the bridge is ready for reads and writes
    pub fn is_ready(&self) -> bool {
        !self.shared.closed.load(Ordering::SeqCst)
    }

    /// Close the bridge
    ///
    /// Idempotent and safe from any thread. Stops the reader task,
    /// discards buffered data and delivers the single `Closed` event.
    pub fn close(&self) {
        self.shared.shut_down();
    }

    /// Take the event receiver (once) to observe the closed notification
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<BridgeEvent>> {
        self.events.lock().unwrap().take()
    }
}

impl Drop for StreamBridge {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for StreamBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBridge")
            .field("ready", &self.is_ready())
            .field("bytes_available", &self.bytes_available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;

    /// In-process receiver backed by a channel of byte chunks
    pub(crate) struct PipeReceiver {
        rx: std_mpsc::Receiver<Vec<u8>>,
        pending: Vec<u8>,
    }

    /// Feeds a [`PipeReceiver`]; dropping it reads as a hard error
    pub(crate) struct PipeFeeder {
        tx: std_mpsc::Sender<Vec<u8>>,
    }

    pub(crate) fn pipe() -> (PipeFeeder, PipeReceiver) {
        let (tx, rx) = std_mpsc::channel();
        (
            PipeFeeder { tx },
            PipeReceiver {
                rx,
                pending: Vec::new(),
            },
        )
    }

    impl PipeFeeder {
        pub(crate) fn feed(&self, data: &[u8]) {
            self.tx.send(data.to_vec()).unwrap();
        }
    }

    impl RawReceiver for PipeReceiver {
        fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> i32 {
            if self.pending.is_empty() {
                match self.rx.recv_timeout(timeout) {
                    Ok(chunk) => self.pending = chunk,
                    Err(std_mpsc::RecvTimeoutError::Timeout) => return 0,
                    Err(std_mpsc::RecvTimeoutError::Disconnected) => return -1,
                }
            }
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            n as i32
        }
    }

    /// Sink that records everything written
    pub(crate) struct RecordingSender {
        pub written: Arc<Mutex<Vec<u8>>>,
    }

    impl RawSender for RecordingSender {
        fn send(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    fn recording_sender() -> (Box<dyn RawSender>, Arc<Mutex<Vec<u8>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        (
            Box::new(RecordingSender {
                written: written.clone(),
            }),
            written,
        )
    }

    #[test]
    fn test_read_buffer_invariants() {
        let mut buffer = ReadBuffer::with_capacity(8);

        assert_eq!(buffer.append(b"hello"), 5);
        assert_eq!(buffer.available(), 5);

        // Over-filling accepts only the free space.
        assert_eq!(buffer.append(b"worldly"), 3);
        assert_eq!(buffer.available(), 8);
        assert!(buffer.available() <= 8);

        // Partial take compacts the remainder to the front.
        let mut out = [0u8; 3];
        assert_eq!(buffer.take(&mut out), 3);
        assert_eq!(&out, b"hel");
        assert_eq!(buffer.available(), 5);

        let mut rest = [0u8; 16];
        let n = buffer.take(&mut rest);
        assert_eq!(n, 5);
        assert_eq!(&rest[..n], b"lowor");
        assert_eq!(buffer.take(&mut rest), 0);
    }

    #[tokio::test]
    async fn test_bridge_read_is_non_blocking() {
        let (feeder, receiver) = pipe();
        let (sender, _) = recording_sender();
        let bridge = StreamBridge::open(Box::new(receiver), sender, 64);

        let mut buf = [0u8; 16];
        assert_eq!(bridge.read(&mut buf), 0);

        feeder.feed(b"projection");
        bridge.readable().await;
        let n = bridge.read(&mut buf);
        assert_eq!(&buf[..n], b"projection");

        bridge.close();
    }

    #[tokio::test]
    async fn test_bridge_write_forwards() {
        let (_feeder, receiver) = pipe();
        let (sender, written) = recording_sender();
        let bridge = StreamBridge::open(Box::new(receiver), sender, 64);

        bridge.write(b"key-event");
        assert_eq!(written.lock().unwrap().as_slice(), b"key-event");

        bridge.close();
        // Writes after close are dropped silently.
        bridge.write(b"late");
        assert_eq!(written.lock().unwrap().as_slice(), b"key-event");
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_notifies_once() {
        let (_feeder, receiver) = pipe();
        let (sender, _) = recording_sender();
        let bridge = Arc::new(StreamBridge::open(Box::new(receiver), sender, 64));
        let mut events = bridge.take_events().unwrap();

        // Two racing closers.
        let b1 = bridge.clone();
        let b2 = bridge.clone();
        let t1 = tokio::spawn(async move { b1.close() });
        let t2 = tokio::spawn(async move { b2.close() });
        t1.await.unwrap();
        t2.await.unwrap();

        assert_eq!(events.recv().await, Some(BridgeEvent::Closed));
        assert!(!bridge.is_ready());

        // A third close after teardown is a no-op and emits nothing.
        bridge.close();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_receiver_error_closes_once() {
        let (feeder, receiver) = pipe();
        let (sender, _) = recording_sender();
        let bridge = StreamBridge::open(Box::new(receiver), sender, 64);
        let mut events = bridge.take_events().unwrap();

        // Dropping the feeder makes receive() report a hard error.
        drop(feeder);

        assert_eq!(events.recv().await, Some(BridgeEvent::Closed));
        assert!(!bridge.is_ready());

        // External close after the reader already tore down: no second event.
        bridge.close();
        assert!(events.try_recv().is_err());
    }
}
