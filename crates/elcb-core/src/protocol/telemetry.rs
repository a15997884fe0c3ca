//! Telemetry records emitted by the ELCB controller over its serial link.
//!
//! Every record is a JSON object on its own line with a `"type"` field that
//! identifies the variant.  Serde's `#[serde(tag = "type")]` attribute maps
//! the discriminant onto [`TelemetryRecord`] automatically:
//!
//! ```json
//! {"type":"boot","status":"ready"}
//! {"type":"data","voltage":230.1,"current":0.004,"fault":false,"tripCurrent":0.0,"tripTime":0}
//! {"type":"fault","tripCurrent":3.219,"tripTime":48213}
//! {"type":"reset","status":"ok"}
//! ```
//!
//! # Verbatim forwarding
//!
//! The bridge never re-serializes a record before handing it to browsers.
//! A [`DeviceFrame`] keeps the exact line text next to the typed record, and
//! the text is what gets broadcast.  Field order and number formatting are
//! therefore exactly what the firmware printed.

use serde::{Deserialize, Serialize};

/// One decoded unit of device-reported state.
///
/// Field names follow the firmware's camelCase keys (`tripCurrent`,
/// `tripTime`); the Rust fields use snake_case with explicit renames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TelemetryRecord {
    /// The controller finished booting and is sampling.
    Boot {
        /// Always `"ready"` on current firmware.
        status: String,
    },

    /// Periodic measurement sample.
    Data {
        /// Line voltage in volts (RMS).
        voltage: f64,
        /// Residual (leakage) current in amperes.
        current: f64,
        /// `true` while the breaker is latched in the tripped state.
        fault: bool,
        /// Leakage current measured at the last trip, in amperes.
        #[serde(rename = "tripCurrent")]
        trip_current: f64,
        /// Device uptime in milliseconds when the last trip occurred.
        #[serde(rename = "tripTime")]
        trip_time: u64,
    },

    /// The breaker has just tripped.
    Fault {
        #[serde(rename = "tripCurrent")]
        trip_current: f64,
        #[serde(rename = "tripTime")]
        trip_time: u64,
    },

    /// The controller acknowledged an `'R'` re-arm command.
    Reset {
        /// Always `"ok"` on current firmware.
        status: String,
    },

    /// A well-formed JSON object this crate does not know how to type.
    ///
    /// Either the `"type"` value is unknown (newer firmware) or the fields do
    /// not match the expected shape.  Such frames are still forwarded
    /// verbatim; only the typed view is unavailable.
    #[serde(other)]
    Unrecognized,
}

impl TelemetryRecord {
    /// Returns the wire discriminant for log messages.
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryRecord::Boot { .. } => "boot",
            TelemetryRecord::Data { .. } => "data",
            TelemetryRecord::Fault { .. } => "fault",
            TelemetryRecord::Reset { .. } => "reset",
            TelemetryRecord::Unrecognized => "unrecognized",
        }
    }
}

/// A complete line received from the device together with its typed view.
///
/// Produced by [`crate::protocol::decoder::FrameDecoder`].  Immutable once
/// decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceFrame {
    /// The trimmed line text exactly as the device sent it (no newline).
    pub raw: String,
    /// The typed interpretation of `raw`.
    pub record: TelemetryRecord,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
