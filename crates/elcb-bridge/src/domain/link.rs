//! Device link status and the events the link reports upward.

use elcb_core::{DeviceFrame, SyntheticEvent};

/// Observable state of the serial link.
///
/// `Connecting` is visible through status queries but is never pushed to
/// subscribers: their `serial_status` only ever says connected or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// No session.  `error` holds the reason the last attempt or session
    /// failed, if any.
    Disconnected { error: Option<String> },
    /// An open attempt is in progress.
    Connecting,
    /// A session is open; commands are accepted.
    Connected,
}

impl LinkStatus {
    /// Returns `true` only while a session is open.
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkStatus::Connected)
    }

    /// Last transport error, if the link is down because of one.
    pub fn error(&self) -> Option<&str> {
        match self {
            LinkStatus::Disconnected { error } => error.as_deref(),
            _ => None,
        }
    }

    /// Lower-case label used in logs and the status API.
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Disconnected { .. } => "disconnected",
            LinkStatus::Connecting => "connecting",
            LinkStatus::Connected => "connected",
        }
    }

    /// The `serial_status` event subscribers should see for this state.
    ///
    /// Returns `None` for `Connecting`.
    pub fn to_status_event(&self) -> Option<SyntheticEvent> {
        match self {
            LinkStatus::Connected => Some(SyntheticEvent::SerialStatus {
                connected: true,
                error: None,
            }),
            LinkStatus::Disconnected { error } => Some(SyntheticEvent::SerialStatus {
                connected: false,
                error: error.clone(),
            }),
            LinkStatus::Connecting => None,
        }
    }
}

impl Default for LinkStatus {
    fn default() -> Self {
        LinkStatus::Disconnected { error: None }
    }
}

/// Something the device link tells the bridge controller.
///
/// Events are delivered in the order the link produced them.  On every new
/// session `HardwareReset` is sent before the `Status` that reports the link
/// as connected.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A valid frame decoded from the device stream.
    Frame(DeviceFrame),
    /// The subscriber-visible link state changed.
    Status {
        connected: bool,
        error: Option<String>,
    },
    /// The device was (re)connected; held fault state is stale.
    HardwareReset,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disconnected_without_error() {
        assert_eq!(LinkStatus::default(), LinkStatus::Disconnected { error: None });
        assert!(!LinkStatus::default().is_connected());
    }

    #[test]
    fn test_connecting_has_no_subscriber_event() {
        assert_eq!(LinkStatus::Connecting.to_status_event(), None);
        assert_eq!(LinkStatus::Connecting.as_str(), "connecting");
    }

    #[test]
    fn test_disconnected_carries_error_into_event() {
        // Arrange
        let status = LinkStatus::Disconnected {
            error: Some("Permission denied".to_string()),
        };

        // Act
        let event = status.to_status_event();

        // Assert
        assert_eq!(status.error(), Some("Permission denied"));
        assert_eq!(
            event,
            Some(SyntheticEvent::SerialStatus {
                connected: false,
                error: Some("Permission denied".to_string()),
            })
        );
    }

    #[test]
    fn test_connected_event() {
        assert!(LinkStatus::Connected.is_connected());
        assert_eq!(LinkStatus::Connected.error(), None);
        assert_eq!(
            LinkStatus::Connected.to_status_event(),
            Some(SyntheticEvent::SerialStatus {
                connected: true,
                error: None,
            })
        );
    }
}
