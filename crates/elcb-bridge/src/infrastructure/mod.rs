//! Infrastructure layer for elcb-bridge.
//!
//! The infrastructure layer handles all I/O: the serial session with the
//! controller, the WebSocket server for subscribers, and the HTTP control
//! API.
//!
//! # Responsibilities
//!
//! - Opening the serial port and keeping the session alive
//! - Binding the WebSocket and HTTP listeners
//! - Performing the WebSocket upgrade handshake
//! - Spawning the link, controller and per-session Tokio tasks
//! - Handling the graceful shutdown signal
//!
//! # What does NOT belong here?
//!
//! - Frame decoding and event rendering (that is `elcb-core`)
//! - Subscriber bookkeeping (that is the application layer)
//! - Configuration parsing (that is done in `main.rs`)

pub mod device_link;
pub mod http_api;
pub mod serial;
pub mod service;
pub mod ws_server;

pub use service::{run_bridge, BridgeService};
