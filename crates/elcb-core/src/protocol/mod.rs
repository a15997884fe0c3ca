//! Protocol module containing the device wire types, bridge events, and the
//! line frame decoder.

pub mod command;
pub mod decoder;
pub mod event;
pub mod telemetry;

pub use command::{ClientCommand, DeviceCommand};
pub use decoder::{decode_line, FrameDecoder, Frames, DEFAULT_MAX_LINE_BYTES};
pub use event::{BridgeEvent, SyntheticEvent};
pub use telemetry::{DeviceFrame, TelemetryRecord};
