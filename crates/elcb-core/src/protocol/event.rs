//! Events the bridge pushes to browser subscribers.
//!
//! Two kinds of event travel over the WebSocket:
//!
//! - **Forwarded telemetry**: the device's own JSON line, sent verbatim.
//! - **Synthesized events**: produced by the bridge itself to describe the
//!   device link:
//!
//! ```json
//! {"type":"serial_status","connected":false,"error":"No such file or directory"}
//! {"type":"hardware_reset"}
//! ```
//!
//! `hardware_reset` tells every dashboard to drop any fault or alarm state it
//! is holding.  A fresh connection means the controller rebooted, so whatever
//! it reported before is no longer authoritative.

use serde::{Deserialize, Serialize};

use crate::protocol::telemetry::DeviceFrame;

/// An event produced by the bridge rather than the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyntheticEvent {
    /// The device link went up or down.
    SerialStatus {
        connected: bool,
        /// Transport error detail, omitted from the JSON when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Any fault state held by subscribers is stale.
    HardwareReset,
}

/// One unit of the bridge → subscriber event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// A device frame, forwarded as the exact text the device sent.
    Telemetry(DeviceFrame),
    /// A status or lifecycle event synthesized by the bridge.
    Synthetic(SyntheticEvent),
}

impl BridgeEvent {
    /// Shorthand for a `serial_status` event.
    pub fn serial_status(connected: bool, error: Option<String>) -> Self {
        BridgeEvent::Synthetic(SyntheticEvent::SerialStatus { connected, error })
    }

    /// Shorthand for the `hardware_reset` event.
    pub fn hardware_reset() -> Self {
        BridgeEvent::Synthetic(SyntheticEvent::HardwareReset)
    }

    /// Renders the event as the text frame sent to subscribers.
    ///
    /// Telemetry is never re-serialized; its original line is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if a synthesized event cannot be
    /// serialized.
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        match self {
            BridgeEvent::Telemetry(frame) => Ok(frame.raw.clone()),
            BridgeEvent::Synthetic(event) => serde_json::to_string(event),
        }
    }

    /// Short name for log messages.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeEvent::Telemetry(frame) => frame.record.kind(),
            BridgeEvent::Synthetic(SyntheticEvent::SerialStatus { .. }) => "serial_status",
            BridgeEvent::Synthetic(SyntheticEvent::HardwareReset) => "hardware_reset",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
