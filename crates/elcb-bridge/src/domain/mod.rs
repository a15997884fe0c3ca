//! Domain layer for elcb-bridge.
//!
//! The domain layer contains pure types that have no dependencies on I/O,
//! networking, or the async runtime.  This makes them easy to test in
//! isolation.
//!
//! # What belongs in the domain layer?
//!
//! - Configuration structures and the retry policy
//! - The device link status and the events the link reports
//! - Error types describing command failures
//! - Endpoint descriptors returned by port discovery
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, `SerialPort`, or WebSocket types
//! - Environment variable reading or CLI parsing

pub mod config;
pub mod errors;
pub mod link;
pub mod ports;

pub use config::{AttemptOutcome, BridgeConfig, RetryPolicy, SerialConfig};
pub use errors::{CommandError, LinkError};
pub use link::{LinkEvent, LinkStatus};
pub use ports::PortDescriptor;
