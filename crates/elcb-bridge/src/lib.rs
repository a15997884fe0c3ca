//! elcb-bridge library crate.
//!
//! This crate bridges the serial line of an earth-leakage circuit breaker
//! controller to browser dashboards over WebSocket.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Controller (JSON lines over serial)
//!         ↕
//! [elcb-bridge]
//!   ├── domain/           Pure types: BridgeConfig, LinkStatus, errors
//!   ├── application/      Subscriber registry and the bridge controller
//!   └── infrastructure/
//!         ├── device_link/  Serial session actor with retry (+ mock)
//!         ├── serial/       serialport-backed transport and port listing
//!         ├── ws_server/    WebSocket accept loop (tokio-tungstenite)
//!         ├── http_api/     Control endpoints (axum)
//!         └── service/      Binds listeners and spawns every task
//!         ↕
//! Browser dashboards (JSON over WebSocket)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `elcb-core`; the device is
//!   reached only through the `DevicePort` trait.
//! - `infrastructure` depends on all other layers plus `tokio`,
//!   `tungstenite`, `axum` and `serialport`.

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: subscriber fan-out and command dispatch.
pub mod application;

/// Infrastructure layer: serial link, WebSocket server, HTTP API.
pub mod infrastructure;
