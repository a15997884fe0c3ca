//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is built once at startup from CLI arguments (see `main.rs`) or from
//! defaults, and never re-read afterwards.
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! reads inside the domain) lets tests spin up a complete bridge on ephemeral
//! ports with millisecond retry delays.

use std::net::SocketAddr;
use std::time::Duration;

use elcb_core::DEFAULT_MAX_LINE_BYTES;

/// Where the controller is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub path: String,
    /// Line rate in baud.  The controller firmware uses 115200.
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
        }
    }
}

/// How the previous connection attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The open call itself failed (port missing, busy, permission denied).
    OpenFailed,
    /// A session that had been open was lost (error or close).
    SessionEnded,
}

/// Fixed reconnect delays for the device link.
///
/// Retries are unbounded; the policy only decides how long to wait.  A lost
/// session is retried sooner than a failed open because the usual cause is
/// the controller rebooting, which takes about a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the open call fails.
    pub open_failure_delay: Duration,
    /// Delay after a previously open session ends.
    pub session_lost_delay: Duration,
}

impl RetryPolicy {
    /// Returns the delay before the next attempt.
    pub fn delay_after(&self, outcome: AttemptOutcome) -> Duration {
        match outcome {
            AttemptOutcome::OpenFailed => self.open_failure_delay,
            AttemptOutcome::SessionEnded => self.session_lost_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            open_failure_delay: Duration::from_millis(5_000),
            session_lost_delay: Duration::from_millis(1_500),
        }
    }
}

/// All runtime configuration for the bridge.
///
/// # Example
///
/// ```rust
/// use elcb_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 8081);
/// assert_eq!(cfg.serial.baud_rate, 115_200);
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Address the WebSocket subscriber server binds to.
    pub ws_bind_addr: SocketAddr,

    /// Address the HTTP control API binds to.
    pub http_bind_addr: SocketAddr,

    /// Serial endpoint of the controller.
    pub serial: SerialConfig,

    /// Reconnect delays for the device link.
    pub retry: RetryPolicy,

    /// Upper bound on a single command write to the device.
    ///
    /// A USB-serial adapter that is being unplugged can block a write
    /// indefinitely; the caller gets `write-timeout` instead of hanging.
    pub write_timeout: Duration,

    /// Upper bound on a single WebSocket write to one subscriber.
    pub client_send_timeout: Duration,

    /// Number of events buffered per subscriber before it is considered
    /// stalled and dropped.
    pub client_queue_depth: usize,

    /// Longest accepted device line; longer lines are discarded.
    pub max_line_bytes: usize,
}

impl Default for BridgeConfig {
    /// Returns a `BridgeConfig` suitable for a bench setup.
    ///
    /// | Field               | Default           |
    /// |---------------------|-------------------|
    /// | ws_bind_addr        | `0.0.0.0:8081`    |
    /// | http_bind_addr      | `0.0.0.0:8080`    |
    /// | serial              | `/dev/ttyUSB0` @ 115200 |
    /// | retry               | 5 s / 1.5 s       |
    /// | write_timeout       | 2 s               |
    /// | client_send_timeout | 2 s               |
    /// | client_queue_depth  | 64                |
    /// | max_line_bytes      | 4096              |
    fn default() -> Self {
        Self {
            ws_bind_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            http_bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            serial: SerialConfig::default(),
            retry: RetryPolicy::default(),
            write_timeout: Duration::from_secs(2),
            client_send_timeout: Duration::from_secs(2),
            client_queue_depth: 64,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
