//! Serial transport for the controller's USB-serial link.
//!
//! # Threading model
//!
//! `serialport` only offers blocking I/O.  Each session gets:
//!
//! - a dedicated reader thread that performs timed blocking reads and
//!   forwards every chunk into a Tokio channel with `blocking_send`;
//! - a writer that runs each write on the blocking pool via
//!   `spawn_blocking`, so a wedged adapter cannot stall the runtime.
//!
//! A write the link has already timed out on keeps running on the blocking
//! pool and may still reach the device.  While it holds the port, later
//! writes fail at once with "write in progress" instead of queueing.
//!
//! The reader thread exits when the session is dropped (the receiver closes
//! or the shared `closed` flag is set), when the port reports an error, or
//! when a read returns end-of-file.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::{LinkError, PortDescriptor, SerialConfig};
use crate::infrastructure::device_link::{CommandWriter, DeviceConnection, DeviceConnector, TransportEvent};

/// Read timeout; bounds how long the reader thread takes to notice shutdown.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Chunks buffered between the reader thread and the link actor.
const READ_CHANNEL_DEPTH: usize = 64;

const READ_BUFFER_BYTES: usize = 1024;

/// Port enumeration failed.
#[derive(Debug, Error)]
#[error("failed to enumerate serial ports: {0}")]
pub struct PortListError(#[from] serialport::Error);

/// Opens 8N1 sessions on a fixed serial path.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    config: SerialConfig,
}

impl SerialConnector {
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }

    fn open_error(&self, reason: impl ToString) -> LinkError {
        LinkError::Open {
            endpoint: self.config.path.clone(),
            reason: reason.to_string(),
        }
    }

    fn setup_error(&self, reason: impl ToString) -> LinkError {
        LinkError::Setup {
            endpoint: self.config.path.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl DeviceConnector for SerialConnector {
    async fn open(&self) -> Result<DeviceConnection, LinkError> {
        let path = self.config.path.clone();
        let baud_rate = self.config.baud_rate;

        let port = tokio::task::spawn_blocking(move || open_port(&path, baud_rate))
            .await
            .map_err(|e| self.open_error(e))?
            .map_err(|e| self.open_error(e))?;

        let reader = port.try_clone().map_err(|e| self.setup_error(e))?;
        let closed = Arc::new(AtomicBool::new(false));
        let (events_tx, events) = mpsc::channel(READ_CHANNEL_DEPTH);

        let reader_closed = Arc::clone(&closed);
        thread::Builder::new()
            .name("elcb-serial-reader".to_string())
            .spawn(move || reader_loop(reader, events_tx, reader_closed))
            .map_err(|e| self.setup_error(e))?;

        info!(
            "opened serial port {} at {} baud",
            self.config.path, self.config.baud_rate
        );

        Ok(DeviceConnection {
            events,
            writer: Box::new(SerialWriter {
                port: Arc::new(Mutex::new(port)),
                closed,
            }),
        })
    }

    fn endpoint(&self) -> String {
        self.config.path.clone()
    }
}

fn open_port(path: &str, baud_rate: u32) -> serialport::Result<Box<dyn SerialPort>> {
    serialport::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(READ_TIMEOUT)
        .open()
}

/// Blocking read loop; runs on its own OS thread.
fn reader_loop(
    mut port: Box<dyn SerialPort>,
    events: mpsc::Sender<TransportEvent>,
    closed: Arc<AtomicBool>,
) {
    let mut buffer = [0u8; READ_BUFFER_BYTES];

    while !closed.load(Ordering::Relaxed) {
        match port.read(&mut buffer) {
            Ok(0) => {
                debug!("serial read returned end-of-file");
                break;
            }
            Ok(n) => {
                if events
                    .blocking_send(TransportEvent::Data(buffer[..n].to_vec()))
                    .is_err()
                {
                    break;
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => {}
            Err(e) => {
                warn!("serial read failed: {e}");
                let _ = events.blocking_send(TransportEvent::Error(e.to_string()));
                break;
            }
        }
    }

    debug!("serial reader thread exiting");
}

struct SerialWriter {
    port: Arc<Mutex<Box<dyn SerialPort>>>,
    closed: Arc<AtomicBool>,
}

/// Takes the port without waiting behind an earlier write.
fn claim_port<T>(port: &Mutex<T>) -> io::Result<MutexGuard<'_, T>> {
    match port.try_lock() {
        Ok(guard) => Ok(guard),
        Err(TryLockError::WouldBlock) => Err(io::Error::new(
            io::ErrorKind::WouldBlock,
            "write in progress",
        )),
        Err(TryLockError::Poisoned(_)) => Err(io::Error::new(
            io::ErrorKind::Other,
            "serial port lock poisoned",
        )),
    }
}

#[async_trait]
impl CommandWriter for SerialWriter {
    async fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        let port = Arc::clone(&self.port);
        tokio::task::spawn_blocking(move || {
            let mut guard = claim_port(&port)?;
            guard.write_all(&[byte])?;
            guard.flush()
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }
}

impl Drop for SerialWriter {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

/// Lists the serial endpoints present on this host, sorted by path.
///
/// # Errors
///
/// Returns [`PortListError`] if the OS enumeration call fails.
pub fn list_ports() -> Result<Vec<PortDescriptor>, PortListError> {
    let mut ports: Vec<PortDescriptor> = serialport::available_ports()?
        .into_iter()
        .map(|info| describe_port(info.port_name, &info.port_type))
        .collect();
    ports.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(ports)
}

fn describe_port(path: String, port_type: &SerialPortType) -> PortDescriptor {
    match port_type {
        SerialPortType::UsbPort(usb) => PortDescriptor {
            path,
            kind: "usb".to_string(),
            manufacturer: usb.manufacturer.clone(),
            product: usb.product.clone(),
        },
        SerialPortType::PciPort => PortDescriptor::new(path, "pci"),
        SerialPortType::BluetoothPort => PortDescriptor::new(path, "bluetooth"),
        SerialPortType::Unknown => PortDescriptor::new(path, "unknown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    #[test]
    fn test_describe_usb_port_keeps_vendor_strings() {
        // Arrange
        let usb = SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x1a86,
            pid: 0x7523,
            serial_number: None,
            manufacturer: Some("QinHeng Electronics".to_string()),
            product: Some("USB Serial".to_string()),
        });

        // Act
        let port = describe_port("/dev/ttyUSB0".to_string(), &usb);

        // Assert
        assert_eq!(port.kind, "usb");
        assert_eq!(port.manufacturer.as_deref(), Some("QinHeng Electronics"));
        assert_eq!(port.product.as_deref(), Some("USB Serial"));
    }

    #[test]
    fn test_describe_non_usb_ports() {
        assert_eq!(
            describe_port("/dev/ttyS0".into(), &SerialPortType::Unknown),
            PortDescriptor::new("/dev/ttyS0", "unknown")
        );
        assert_eq!(
            describe_port("/dev/rfcomm0".into(), &SerialPortType::BluetoothPort).kind,
            "bluetooth"
        );
        assert_eq!(describe_port("COM1".into(), &SerialPortType::PciPort).kind, "pci");
    }

    #[test]
    fn test_claim_port_fails_fast_while_a_write_holds_it() {
        // Arrange: an earlier write still owns the port.
        let port = Mutex::new(0u8);
        let _in_flight = claim_port(&port).unwrap();

        // Act
        let err = claim_port(&port).unwrap_err();

        // Assert
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        assert_eq!(err.to_string(), "write in progress");
    }

    #[test]
    fn test_claim_port_succeeds_once_released() {
        let port = Mutex::new(0u8);
        drop(claim_port(&port).unwrap());
        assert!(claim_port(&port).is_ok());
    }

    #[tokio::test]
    async fn test_open_missing_port_reports_path() {
        // Arrange
        let connector = SerialConnector::new(SerialConfig {
            path: "/dev/elcb-does-not-exist".to_string(),
            baud_rate: 115_200,
        });

        // Act
        let result = connector.open().await;

        // Assert
        match result {
            Err(LinkError::Open { endpoint, reason }) => {
                assert_eq!(endpoint, "/dev/elcb-does-not-exist");
                assert!(!reason.is_empty());
            }
            Err(other) => panic!("expected open error, got {other}"),
            Ok(_) => panic!("opening a missing port must fail"),
        }
    }
}
