//! Transport layer
//!
//! One binding per physical/logical channel type (TCP socket, custom
//! bulk-transfer endpoint), all behind a common capability trait. The
//! scan driver and the connection orchestrator only ever talk to the
//! trait; transport selection happens at construction time.

mod r#trait;
pub mod bulk;
pub mod scanner;
pub mod tcp;

pub use bulk::{BulkBinding, BulkChannel, BulkEndpointInfo, BulkHost, BULK_TRANSPORT_ID};
pub use r#trait::{ConnectFailure, TransportBinding};
pub use scanner::{DeviceScanner, ScanConfig, DEFAULT_SCAN_POLL_INTERVAL};
pub use tcp::{TcpBinding, TcpBindingConfig, TCP_TRANSPORT_ID};
