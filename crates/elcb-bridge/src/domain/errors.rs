//! Error types shared by the link, the controller, and the HTTP API.

use std::time::Duration;

use thiserror::Error;

/// Why a device command was not delivered.
///
/// Each variant maps to a stable machine-readable reason through
/// [`CommandError::reason`]; the HTTP API returns that string to callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// No session is open.  The command is dropped, not queued.
    #[error("device is not connected")]
    NotConnected,

    /// The transport reported an error while writing.
    #[error("write to device failed: {0}")]
    WriteFailed(String),

    /// The write did not complete within the configured bound.
    #[error("write to device did not complete within {0:?}")]
    Timeout(Duration),

    /// The device link task has stopped.
    #[error("device link is shut down")]
    LinkClosed,
}

impl CommandError {
    /// Stable reason code for API responses.
    pub fn reason(&self) -> &'static str {
        match self {
            CommandError::NotConnected => "not-connected",
            CommandError::WriteFailed(_) => "write-failed",
            CommandError::Timeout(_) => "write-timeout",
            CommandError::LinkClosed => "link-closed",
        }
    }
}

/// Failure to establish a device session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    /// The endpoint could not be opened.
    #[error("failed to open {endpoint}: {reason}")]
    Open { endpoint: String, reason: String },

    /// The endpoint opened but the session could not be set up.
    #[error("failed to start session on {endpoint}: {reason}")]
    Setup { endpoint: String, reason: String },
}

impl LinkError {
    /// The bare transport message, as reported to subscribers in
    /// `serial_status.error`.
    pub fn reason(&self) -> &str {
        match self {
            LinkError::Open { reason, .. } | LinkError::Setup { reason, .. } => reason,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes_are_stable() {
        assert_eq!(CommandError::NotConnected.reason(), "not-connected");
        assert_eq!(CommandError::WriteFailed("EIO".into()).reason(), "write-failed");
        assert_eq!(
            CommandError::Timeout(Duration::from_secs(2)).reason(),
            "write-timeout"
        );
        assert_eq!(CommandError::LinkClosed.reason(), "link-closed");
    }

    #[test]
    fn test_write_failed_display_includes_cause() {
        let err = CommandError::WriteFailed("Input/output error".into());
        assert_eq!(err.to_string(), "write to device failed: Input/output error");
    }

    #[test]
    fn test_link_error_reason_is_bare_message() {
        // Arrange
        let err = LinkError::Open {
            endpoint: "/dev/ttyUSB0".into(),
            reason: "No such file or directory".into(),
        };

        // Assert
        assert_eq!(err.reason(), "No such file or directory");
        assert_eq!(
            err.to_string(),
            "failed to open /dev/ttyUSB0: No such file or directory"
        );
    }
}
