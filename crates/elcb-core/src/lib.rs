//! # elcb-core
//!
//! Shared protocol library for the ELCB bridge: the JSON-lines wire format
//! spoken by the earth-leakage circuit breaker controller, the events the
//! bridge pushes to browser subscribers, and the streaming frame decoder that
//! turns raw serial bytes into telemetry records.
//!
//! This crate has zero dependencies on async runtimes, serial ports, or
//! sockets.  Everything here is plain data plus pure functions, so it can be
//! tested (and benchmarked) without hardware.
//!
//! # Architecture overview (for beginners)
//!
//! The device prints one JSON object per line on its serial port:
//!
//! ```text
//! {"type":"data","voltage":229.8,"current":0.012,"fault":false,"tripCurrent":0,"tripTime":0}
//! {"type":"fault","tripCurrent":3.219,"tripTime":48213}
//! ```
//!
//! - **`protocol::decoder`** buffers bytes until a newline and yields
//!   [`DeviceFrame`]s, silently dropping boot noise and partial writes.
//! - **`protocol::telemetry`** holds the typed [`TelemetryRecord`] variants.
//! - **`protocol::event`** is what the bridge sends to browsers: forwarded
//!   telemetry plus the synthesized `serial_status` and `hardware_reset`
//!   events.
//! - **`protocol::command`** is the reverse direction: the `RESET` text a
//!   browser sends, and the single `'R'` byte the device understands.

pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `elcb_core::FrameDecoder` instead of `elcb_core::protocol::decoder::FrameDecoder`.
pub use protocol::command::{ClientCommand, DeviceCommand};
pub use protocol::decoder::{decode_line, FrameDecoder, DEFAULT_MAX_LINE_BYTES};
pub use protocol::event::{BridgeEvent, SyntheticEvent};
pub use protocol::telemetry::{DeviceFrame, TelemetryRecord};
