//! Commands flowing from subscribers to the device.
//!
//! The browser protocol has exactly one command: the text `RESET`.  The
//! device protocol has exactly one command byte: `'R'` (re-arm the breaker).
//! Keeping the two as separate types makes the translation explicit.

/// A command recognized in a subscriber's text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    /// Re-arm the breaker.
    Reset,
}

impl ClientCommand {
    /// Parses a subscriber text message.
    ///
    /// Matching is case-insensitive after trimming surrounding whitespace.
    /// Anything else returns `None` and is meant to be ignored silently.
    ///
    /// ```rust
    /// use elcb_core::ClientCommand;
    ///
    /// assert_eq!(ClientCommand::parse("  reset \n"), Some(ClientCommand::Reset));
    /// assert_eq!(ClientCommand::parse("RESET NOW"), None);
    /// ```
    pub fn parse(text: &str) -> Option<Self> {
        if text.trim().eq_ignore_ascii_case("RESET") {
            Some(ClientCommand::Reset)
        } else {
            None
        }
    }

    /// The device command this client command maps to.
    pub fn device_command(self) -> DeviceCommand {
        match self {
            ClientCommand::Reset => DeviceCommand::Reset,
        }
    }
}

/// A command written to the device's serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Re-arm / reset, sent as the single byte `'R'`.
    Reset,
}

impl DeviceCommand {
    /// The byte written to the serial port.
    pub const fn as_byte(self) -> u8 {
        match self {
            DeviceCommand::Reset => b'R',
        }
    }
}
