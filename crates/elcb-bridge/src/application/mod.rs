//! Application layer for elcb-bridge.
//!
//! The application layer orchestrates the business logic: it knows *what* to
//! do, but delegates *how* to do it to the infrastructure layer.
//!
//! # Responsibilities
//!
//! - Tracking live subscribers and fanning events out to them
//! - Turning subscriber text into device commands
//! - Replaying the current link status to new subscribers
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or serial ports (that is infrastructure)
//! - WebSocket framing (handled by tokio-tungstenite)
//! - Retry timing for the device link

pub mod bridge_controller;
pub mod client_registry;

pub use bridge_controller::{BridgeController, BridgeHandle, ClientInput, ControllerStopped, DevicePort};
pub use client_registry::{BroadcastReport, ClientHandle, ClientId, ClientRegistry, SendFailure};
