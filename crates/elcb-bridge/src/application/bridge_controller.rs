//! BridgeController: wires the device link to the subscriber registry.
//!
//! The controller is a single task that owns the [`ClientRegistry`].  It
//! consumes two ordered streams:
//!
//! - [`LinkEvent`]s from the device link (frames, status, hardware reset)
//! - [`ClientInput`]s from WebSocket sessions (connect, text, disconnect)
//!
//! Every device frame and every synthesized event is rendered once and fanned
//! out to all subscribers.  A `RESET` from any subscriber becomes a
//! [`DeviceCommand::Reset`] sent through the [`DevicePort`].
//!
//! # Architecture
//!
//! The controller depends only on the `DevicePort` trait and domain types.
//! The concrete device link is injected at construction time, which keeps the
//! controller unit-testable without a serial port.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use elcb_core::{BridgeEvent, DeviceCommand, SyntheticEvent, TelemetryRecord};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::client_registry::{ClientHandle, ClientId, ClientRegistry};
use crate::domain::{CommandError, LinkEvent, LinkStatus};

/// Depth of the session → controller input channel.
const CLIENT_INPUT_CHANNEL_DEPTH: usize = 256;

/// Command path to the device.
///
/// The infrastructure implementation is the device link handle; tests use a
/// mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DevicePort: Send + Sync {
    /// Writes one command to the device.
    ///
    /// Fails immediately with [`CommandError::NotConnected`] when no session
    /// is open.  Commands are never queued for a later session.
    async fn send_command(&self, command: DeviceCommand) -> Result<(), CommandError>;

    /// Current link status.
    fn link_status(&self) -> LinkStatus;
}

/// Something a WebSocket session tells the controller.
#[derive(Debug)]
pub enum ClientInput {
    /// A subscriber finished its handshake.
    Connected(ClientHandle),
    /// A subscriber sent a text frame.
    Text { id: ClientId, text: String },
    /// A subscriber's socket closed.
    Disconnected(ClientId),
}

/// The controller task has stopped.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("bridge controller is not running")]
pub struct ControllerStopped;

/// Cloneable front door to a running controller.
///
/// Used by WebSocket sessions to report client activity and by the HTTP API
/// to trigger resets and read status.
#[derive(Clone)]
pub struct BridgeHandle {
    inputs: mpsc::Sender<ClientInput>,
    device: Arc<dyn DevicePort>,
    client_count: Arc<AtomicUsize>,
}

impl BridgeHandle {
    /// Sends the reset command to the device.
    ///
    /// # Errors
    ///
    /// Returns the [`CommandError`] reported by the device link.
    pub async fn trigger_reset(&self) -> Result<(), CommandError> {
        self.device.send_command(DeviceCommand::Reset).await
    }

    pub fn link_status(&self) -> LinkStatus {
        self.device.link_status()
    }

    /// Number of registered subscribers.
    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::Relaxed)
    }

    pub async fn client_connected(&self, handle: ClientHandle) -> Result<(), ControllerStopped> {
        self.submit(ClientInput::Connected(handle)).await
    }

    pub async fn client_text(&self, id: ClientId, text: String) -> Result<(), ControllerStopped> {
        self.submit(ClientInput::Text { id, text }).await
    }

    pub async fn client_disconnected(&self, id: ClientId) -> Result<(), ControllerStopped> {
        self.submit(ClientInput::Disconnected(id)).await
    }

    async fn submit(&self, input: ClientInput) -> Result<(), ControllerStopped> {
        self.inputs.send(input).await.map_err(|_| ControllerStopped)
    }
}

/// Owns the subscriber registry and routes events between link and clients.
pub struct BridgeController {
    registry: ClientRegistry,
    device: Arc<dyn DevicePort>,
    inputs: mpsc::Receiver<ClientInput>,
    /// Last `serial_status` broadcast; replayed to each new subscriber.
    last_status: SyntheticEvent,
    client_count: Arc<AtomicUsize>,
}

impl BridgeController {
    /// Creates a controller and the handle used to reach it.
    pub fn new(device: Arc<dyn DevicePort>) -> (Self, BridgeHandle) {
        let (inputs_tx, inputs) = mpsc::channel(CLIENT_INPUT_CHANNEL_DEPTH);
        let client_count = Arc::new(AtomicUsize::new(0));

        let handle = BridgeHandle {
            inputs: inputs_tx,
            device: Arc::clone(&device),
            client_count: Arc::clone(&client_count),
        };
        let controller = Self {
            registry: ClientRegistry::new(),
            device,
            inputs,
            last_status: SyntheticEvent::SerialStatus {
                connected: false,
                error: None,
            },
            client_count,
        };
        (controller, handle)
    }

    /// Runs until the link event stream or the client input stream closes.
    pub async fn run(mut self, mut link_events: mpsc::Receiver<LinkEvent>) {
        info!("bridge controller started");
        loop {
            tokio::select! {
                event = link_events.recv() => match event {
                    Some(event) => self.handle_link_event(event),
                    None => {
                        debug!("device link event stream closed");
                        break;
                    }
                },
                input = self.inputs.recv() => match input {
                    Some(input) => {
                        self.handle_client_input(input);
                    }
                    None => {
                        debug!("all bridge handles dropped");
                        break;
                    }
                },
            }
        }
        info!("bridge controller stopped");
    }

    /// Applies one link event: frames and status changes are broadcast.
    pub fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Frame(frame) => {
                if let TelemetryRecord::Fault {
                    trip_current,
                    trip_time,
                } = frame.record
                {
                    warn!("device tripped: {trip_current} A after {trip_time} ms");
                }
                self.broadcast(BridgeEvent::Telemetry(frame));
            }
            LinkEvent::Status { connected, error } => {
                let status = SyntheticEvent::SerialStatus { connected, error };
                self.last_status = status.clone();
                self.broadcast(BridgeEvent::Synthetic(status));
            }
            LinkEvent::HardwareReset => {
                info!("device session started; clearing subscriber fault state");
                self.broadcast(BridgeEvent::hardware_reset());
            }
        }
    }

    /// Applies one client input.
    ///
    /// Returns the spawned dispatch task when the input produced a device
    /// command.  Dispatch failures are logged, never sent back to the client.
    pub fn handle_client_input(&mut self, input: ClientInput) -> Option<JoinHandle<()>> {
        match input {
            ClientInput::Connected(handle) => {
                let id = handle.id();
                if self.registry.register(handle) {
                    info!("subscriber {id} connected ({} total)", self.registry.len());
                    self.send_current_status(id);
                }
                self.sync_client_count();
                None
            }
            ClientInput::Disconnected(id) => {
                if self.registry.unregister(id) {
                    info!("subscriber {id} disconnected ({} remaining)", self.registry.len());
                }
                self.sync_client_count();
                None
            }
            ClientInput::Text { id, text } => {
                let command = self.registry.receive_from_client(id, &text)?;
                info!("subscriber {id} requested {command:?}");
                Some(self.dispatch(command.device_command()))
            }
        }
    }

    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    fn dispatch(&self, command: DeviceCommand) -> JoinHandle<()> {
        let device = Arc::clone(&self.device);
        tokio::spawn(async move {
            if let Err(e) = device.send_command(command).await {
                warn!("{command:?} from subscriber not delivered: {e}");
            }
        })
    }

    fn send_current_status(&mut self, id: ClientId) {
        let frame = match serde_json::to_string(&self.last_status) {
            Ok(frame) => frame,
            Err(e) => {
                error!("failed to render serial_status: {e}");
                return;
            }
        };
        if let Err(failure) = self.registry.send_to(id, &frame) {
            warn!("subscriber {id} dropped before initial status: {failure:?}");
        }
    }

    fn broadcast(&mut self, event: BridgeEvent) {
        let frame = match event.to_wire() {
            Ok(frame) => frame,
            Err(e) => {
                error!("failed to render {} event: {e}", event.kind());
                return;
            }
        };

        let report = self.registry.broadcast(&frame);
        for (id, failure) in &report.dropped {
            warn!("subscriber {id} dropped during {} broadcast: {failure:?}", event.kind());
        }
        if !report.dropped.is_empty() {
            self.sync_client_count();
        }
    }

    fn sync_client_count(&self) {
        self.client_count.store(self.registry.len(), Ordering::Relaxed);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use elcb_core::decode_line;
    use mockall::predicate::eq;
    use std::time::Duration;

    fn controller_with(device: MockDevicePort) -> (BridgeController, BridgeHandle) {
        BridgeController::new(Arc::new(device))
    }

    fn connect(controller: &mut BridgeController) -> (ClientId, mpsc::Receiver<String>) {
        let (handle, rx) = ClientHandle::channel(16);
        let id = handle.id();
        controller.handle_client_input(ClientInput::Connected(handle));
        (id, rx)
    }

    #[test]
    fn test_new_subscriber_receives_current_status() {
        // Arrange
        let (mut controller, _handle) = controller_with(MockDevicePort::new());

        // Act
        let (_id, mut rx) = connect(&mut controller);

        // Assert
        assert_eq!(rx.try_recv().unwrap(), r#"{"type":"serial_status","connected":false}"#);
        assert_eq!(controller.client_count(), 1);
    }

    #[test]
    fn test_late_subscriber_sees_latest_status() {
        let (mut controller, _handle) = controller_with(MockDevicePort::new());
        controller.handle_link_event(LinkEvent::Status {
            connected: true,
            error: None,
        });

        let (_id, mut rx) = connect(&mut controller);

        assert_eq!(rx.try_recv().unwrap(), r#"{"type":"serial_status","connected":true}"#);
    }

    #[test]
    fn test_frames_are_broadcast_verbatim() {
        // Arrange
        let (mut controller, _handle) = controller_with(MockDevicePort::new());
        let (_a, mut rx_a) = connect(&mut controller);
        let (_b, mut rx_b) = connect(&mut controller);
        rx_a.try_recv().unwrap();
        rx_b.try_recv().unwrap();
        let line = r#"{"type":"fault","tripCurrent":3.2,"tripTime":48}"#;

        // Act
        controller.handle_link_event(LinkEvent::Frame(decode_line(line).unwrap()));

        // Assert
        assert_eq!(rx_a.try_recv().unwrap(), line);
        assert_eq!(rx_b.try_recv().unwrap(), line);
    }

    #[test]
    fn test_reconnect_events_reach_subscribers_in_order() {
        let (mut controller, _handle) = controller_with(MockDevicePort::new());
        let (_id, mut rx) = connect(&mut controller);
        rx.try_recv().unwrap();

        controller.handle_link_event(LinkEvent::HardwareReset);
        controller.handle_link_event(LinkEvent::Status {
            connected: true,
            error: None,
        });

        assert_eq!(rx.try_recv().unwrap(), r#"{"type":"hardware_reset"}"#);
        assert_eq!(rx.try_recv().unwrap(), r#"{"type":"serial_status","connected":true}"#);
    }

    #[test]
    fn test_disconnect_status_carries_error() {
        let (mut controller, _handle) = controller_with(MockDevicePort::new());
        let (_id, mut rx) = connect(&mut controller);
        rx.try_recv().unwrap();

        controller.handle_link_event(LinkEvent::Status {
            connected: false,
            error: Some("No such file or directory".into()),
        });

        assert_eq!(
            rx.try_recv().unwrap(),
            r#"{"type":"serial_status","connected":false,"error":"No such file or directory"}"#
        );
    }

    #[tokio::test]
    async fn test_padded_reset_dispatches_exactly_one_command() {
        // Arrange
        let mut device = MockDevicePort::new();
        device
            .expect_send_command()
            .with(eq(DeviceCommand::Reset))
            .times(1)
            .returning(|_| Ok(()));
        let (mut controller, _handle) = controller_with(device);
        let (id, _rx) = connect(&mut controller);

        // Act
        let task = controller.handle_client_input(ClientInput::Text {
            id,
            text: "  reset  ".to_string(),
        });

        // Assert
        task.expect("reset dispatches a command").await.unwrap();
    }

    #[tokio::test]
    async fn test_unrecognised_text_dispatches_nothing() {
        let mut device = MockDevicePort::new();
        device.expect_send_command().times(0);
        let (mut controller, _handle) = controller_with(device);
        let (id, _rx) = connect(&mut controller);

        for text in ["hello", "RESET!", "{\"cmd\":\"RESET\"}", ""] {
            let task = controller.handle_client_input(ClientInput::Text {
                id,
                text: text.to_string(),
            });
            assert!(task.is_none(), "{text:?} must not dispatch");
        }
    }

    #[tokio::test]
    async fn test_reset_while_disconnected_is_logged_not_fatal() {
        // Arrange
        let mut device = MockDevicePort::new();
        device
            .expect_send_command()
            .times(1)
            .returning(|_| Err(CommandError::NotConnected));
        let (mut controller, _handle) = controller_with(device);
        let (id, mut rx) = connect(&mut controller);
        rx.try_recv().unwrap();

        // Act
        let task = controller.handle_client_input(ClientInput::Text {
            id,
            text: "RESET".to_string(),
        });
        task.unwrap().await.unwrap();

        // Assert: nothing sent back, subscriber still registered.
        assert!(rx.try_recv().is_err());
        assert_eq!(controller.client_count(), 1);
    }

    #[tokio::test]
    async fn test_trigger_reset_reports_device_error() {
        let mut device = MockDevicePort::new();
        device
            .expect_send_command()
            .returning(|_| Err(CommandError::NotConnected));
        let (_controller, handle) = controller_with(device);

        assert_eq!(handle.trigger_reset().await, Err(CommandError::NotConnected));
    }

    #[test]
    fn test_link_status_is_read_from_device() {
        let mut device = MockDevicePort::new();
        device
            .expect_link_status()
            .returning(|| LinkStatus::Connecting);
        let (_controller, handle) = controller_with(device);

        assert_eq!(handle.link_status(), LinkStatus::Connecting);
    }

    #[test]
    fn test_stalled_subscriber_is_dropped_and_count_updated() {
        // Arrange
        let (mut controller, handle) = controller_with(MockDevicePort::new());
        let (stalled, rx_stalled) = ClientHandle::channel(1);
        controller.handle_client_input(ClientInput::Connected(stalled));
        let (_ok, mut rx_ok) = connect(&mut controller);
        assert_eq!(handle.client_count(), 2);

        // Act: the stalled queue already holds its initial status.
        controller.handle_link_event(LinkEvent::HardwareReset);

        // Assert
        assert_eq!(handle.client_count(), 1);
        rx_ok.try_recv().unwrap();
        assert_eq!(rx_ok.try_recv().unwrap(), r#"{"type":"hardware_reset"}"#);
        drop(rx_stalled);
    }

    #[tokio::test]
    async fn test_run_loop_routes_link_events_and_client_input() {
        // Arrange
        let (controller, handle) = controller_with(MockDevicePort::new());
        let (link_tx, link_rx) = mpsc::channel(8);
        let task = tokio::spawn(controller.run(link_rx));
        let (client, mut rx) = ClientHandle::channel(8);
        let id = client.id();

        // Act
        handle.client_connected(client).await.unwrap();
        link_tx.send(LinkEvent::HardwareReset).await.unwrap();

        // Assert
        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(first.as_deref(), Some(r#"{"type":"serial_status","connected":false}"#));
        assert_eq!(second.as_deref(), Some(r#"{"type":"hardware_reset"}"#));
        assert_eq!(handle.client_count(), 1);

        handle.client_disconnected(id).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while handle.client_count() != 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("disconnect processed");

        // Closing the link stream stops the controller.
        drop(link_tx);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
