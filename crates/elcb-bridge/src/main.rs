//! ELCB bridge entry point.
//!
//! This binary owns the serial link to an earth-leakage circuit breaker
//! controller and republishes everything the controller reports to any
//! number of browser dashboards over WebSocket.  Dashboards can send `RESET`
//! to re-arm the breaker; the same action is available over HTTP.
//!
//! # Usage
//!
//! ```text
//! elcb-bridge [OPTIONS]
//!
//! Options:
//!   --serial-port <PATH>          Controller serial port [default: /dev/ttyUSB0]
//!   --baud-rate <BAUD>            Line rate [default: 115200]
//!   --ws-bind <IP>                Bind address for both servers [default: 0.0.0.0]
//!   --ws-port <PORT>              WebSocket port [default: 8081]
//!   --http-port <PORT>            HTTP control API port [default: 8080]
//!   --open-retry-ms <MS>          Delay after a failed open [default: 5000]
//!   --reopen-retry-ms <MS>        Delay after a lost session [default: 1500]
//!   --write-timeout-ms <MS>       Bound on a device write [default: 2000]
//!   --client-send-timeout-ms <MS> Bound on a subscriber write [default: 2000]
//!   --client-queue-depth <N>      Events buffered per subscriber [default: 64]
//!   --max-line-bytes <N>          Longest accepted device line [default: 4096]
//!   --log-level <FILTER>          Log filter when RUST_LOG is unset [default: info]
//!   --list-ports                  Print serial endpoints and exit
//! ```
//!
//! Every option except `--list-ports` can also be set with an `ELCB_*`
//! environment variable (e.g. `ELCB_SERIAL_PORT`).  CLI args take precedence
//! when both are present.
//!
//! # Architecture overview
//!
//! ```text
//! Controller (JSON lines over serial, 115200 8N1)
//!       ↕
//! elcb-bridge  ← this process
//!   infrastructure/device_link  open / read / retry, 'R' writes
//!   application/bridge_controller  fan-out, RESET dispatch
//!   infrastructure/ws_server  subscriber sessions (port 8081)
//!   infrastructure/http_api   /api/reset, /api/ports, /api/status (port 8080)
//!       ↕
//! Browser dashboards (JSON over WebSocket)
//! ```

use std::net::{IpAddr, SocketAddr};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use elcb_bridge::domain::{BridgeConfig, RetryPolicy, SerialConfig};
use elcb_bridge::infrastructure::run_bridge;
use elcb_bridge::infrastructure::serial::list_ports;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Serial-to-WebSocket bridge for an ELCB controller.
#[derive(Debug, Parser)]
#[command(
    name = "elcb-bridge",
    about = "Serial-to-WebSocket bridge for an earth-leakage circuit breaker controller",
    version
)]
struct Cli {
    /// Serial port the controller is attached to.
    #[arg(long, default_value = "/dev/ttyUSB0", env = "ELCB_SERIAL_PORT")]
    serial_port: String,

    /// Serial line rate in baud.
    #[arg(long, default_value_t = 115_200, env = "ELCB_BAUD_RATE")]
    baud_rate: u32,

    /// IP address both servers bind to.
    ///
    /// Use `127.0.0.1` to accept only local dashboards.
    #[arg(long, default_value = "0.0.0.0", env = "ELCB_WS_BIND")]
    ws_bind: String,

    /// TCP port for WebSocket subscribers.
    #[arg(long, default_value_t = 8081, env = "ELCB_WS_PORT")]
    ws_port: u16,

    /// TCP port for the HTTP control API.
    #[arg(long, default_value_t = 8080, env = "ELCB_HTTP_PORT")]
    http_port: u16,

    /// Milliseconds to wait after the serial port fails to open.
    #[arg(long, default_value_t = 5_000, env = "ELCB_OPEN_RETRY_MS")]
    open_retry_ms: u64,

    /// Milliseconds to wait after an open session is lost.
    #[arg(long, default_value_t = 1_500, env = "ELCB_REOPEN_RETRY_MS")]
    reopen_retry_ms: u64,

    /// Upper bound in milliseconds on one command write to the device.
    #[arg(long, default_value_t = 2_000, env = "ELCB_WRITE_TIMEOUT_MS")]
    write_timeout_ms: u64,

    /// Upper bound in milliseconds on one WebSocket write to a subscriber.
    #[arg(long, default_value_t = 2_000, env = "ELCB_CLIENT_SEND_TIMEOUT_MS")]
    client_send_timeout_ms: u64,

    /// Events buffered per subscriber before it is dropped as stalled.
    #[arg(long, default_value_t = 64, env = "ELCB_CLIENT_QUEUE_DEPTH")]
    client_queue_depth: usize,

    /// Longest device line accepted, in bytes.
    #[arg(long, default_value_t = 4096, env = "ELCB_MAX_LINE_BYTES")]
    max_line_bytes: usize,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info", env = "ELCB_LOG_LEVEL")]
    log_level: String,

    /// Print the serial ports on this host and exit.
    #[arg(long)]
    list_ports: bool,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--ws-bind` is not a valid IP address or a count
    /// option is zero.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let bind_ip: IpAddr = self
            .ws_bind
            .parse()
            .with_context(|| format!("invalid bind address: '{}'", self.ws_bind))?;

        if self.client_queue_depth == 0 {
            anyhow::bail!("--client-queue-depth must be at least 1");
        }
        if self.max_line_bytes == 0 {
            anyhow::bail!("--max-line-bytes must be at least 1");
        }

        Ok(BridgeConfig {
            ws_bind_addr: SocketAddr::new(bind_ip, self.ws_port),
            http_bind_addr: SocketAddr::new(bind_ip, self.http_port),
            serial: SerialConfig {
                path: self.serial_port,
                baud_rate: self.baud_rate,
            },
            retry: RetryPolicy {
                open_failure_delay: Duration::from_millis(self.open_retry_ms),
                session_lost_delay: Duration::from_millis(self.reopen_retry_ms),
            },
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            client_send_timeout: Duration::from_millis(self.client_send_timeout_ms),
            client_queue_depth: self.client_queue_depth,
            max_line_bytes: self.max_line_bytes,
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    if cli.list_ports {
        for port in list_ports()? {
            match (&port.manufacturer, &port.product) {
                (Some(manufacturer), Some(product)) => {
                    println!("{}\t{}\t{manufacturer} {product}", port.path, port.kind)
                }
                _ => println!("{}\t{}", port.path, port.kind),
            }
        }
        return Ok(());
    }

    let config = cli.into_bridge_config()?;

    info!(
        "ELCB bridge starting: serial={} @ {} baud, ws={}, http={}",
        config.serial.path, config.serial.baud_rate, config.ws_bind_addr, config.http_bind_addr
    );

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_bridge(config, running).await?;

    info!("ELCB bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Cli {
        Cli::parse_from(["elcb-bridge"])
    }

    #[test]
    fn test_cli_defaults() {
        // Arrange / Act
        let cli = defaults();

        // Assert
        assert_eq!(cli.serial_port, "/dev/ttyUSB0");
        assert_eq!(cli.baud_rate, 115_200);
        assert_eq!(cli.ws_port, 8081);
        assert_eq!(cli.http_port, 8080);
        assert_eq!(cli.open_retry_ms, 5_000);
        assert_eq!(cli.reopen_retry_ms, 1_500);
        assert!(!cli.list_ports);
    }

    #[test]
    fn test_cli_serial_port_override() {
        let cli = Cli::parse_from(["elcb-bridge", "--serial-port", "COM3"]);
        assert_eq!(cli.serial_port, "COM3");
    }

    #[test]
    fn test_cli_list_ports_flag() {
        let cli = Cli::parse_from(["elcb-bridge", "--list-ports"]);
        assert!(cli.list_ports);
    }

    #[test]
    fn test_into_bridge_config_defaults_match_domain_defaults() {
        // Arrange
        let expected = BridgeConfig::default();

        // Act
        let config = defaults().into_bridge_config().unwrap();

        // Assert
        assert_eq!(config.ws_bind_addr, expected.ws_bind_addr);
        assert_eq!(config.http_bind_addr, expected.http_bind_addr);
        assert_eq!(config.serial, expected.serial);
        assert_eq!(config.retry, expected.retry);
        assert_eq!(config.write_timeout, expected.write_timeout);
        assert_eq!(config.client_send_timeout, expected.client_send_timeout);
        assert_eq!(config.client_queue_depth, expected.client_queue_depth);
        assert_eq!(config.max_line_bytes, expected.max_line_bytes);
    }

    #[test]
    fn test_into_bridge_config_shares_bind_ip() {
        let cli = Cli::parse_from([
            "elcb-bridge",
            "--ws-bind",
            "127.0.0.1",
            "--ws-port",
            "9001",
            "--http-port",
            "9000",
        ]);
        let config = cli.into_bridge_config().unwrap();
        assert_eq!(config.ws_bind_addr.to_string(), "127.0.0.1:9001");
        assert_eq!(config.http_bind_addr.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn test_into_bridge_config_retry_and_timeouts() {
        let cli = Cli::parse_from([
            "elcb-bridge",
            "--open-retry-ms",
            "250",
            "--reopen-retry-ms",
            "100",
            "--write-timeout-ms",
            "50",
            "--client-send-timeout-ms",
            "75",
        ]);
        let config = cli.into_bridge_config().unwrap();
        assert_eq!(config.retry.open_failure_delay, Duration::from_millis(250));
        assert_eq!(config.retry.session_lost_delay, Duration::from_millis(100));
        assert_eq!(config.write_timeout, Duration::from_millis(50));
        assert_eq!(config.client_send_timeout, Duration::from_millis(75));
    }

    #[test]
    fn test_into_bridge_config_invalid_bind_returns_error() {
        // Arrange
        let mut cli = defaults();
        cli.ws_bind = "not.an.ip".to_string();

        // Act
        let result = cli.into_bridge_config();

        // Assert: must return an error, not panic
        assert!(result.is_err());
    }

    #[test]
    fn test_into_bridge_config_rejects_zero_queue_depth() {
        let mut cli = defaults();
        cli.client_queue_depth = 0;
        assert!(cli.into_bridge_config().is_err());
    }

    #[test]
    fn test_into_bridge_config_rejects_zero_line_bound() {
        let mut cli = defaults();
        cli.max_line_bytes = 0;
        assert!(cli.into_bridge_config().is_err());
    }
}
