//! Device link: owns the serial session and keeps it alive.
//!
//! The [`DeviceLinkManager`] is an actor task.  It is the only place that
//! touches the transport, so the decoder, the retry timer, and the status
//! never need a lock.  Other tasks talk to it through a cloneable
//! [`DeviceLinkHandle`]: commands go in over an mpsc channel with a oneshot
//! reply, and status comes out through a `watch` channel.
//!
//! # Lifecycle
//!
//! ```text
//!             open ok                    transport error / close
//! Connecting ─────────► Connected ───────────────────────────────┐
//!     ▲  │                                                        │
//!     │  │ open failed                                            ▼
//!     │  └───────────────► Disconnected{error} ◄─────────────────-┘
//!     │                          │
//!     └──── retry timer fires ───┘  (5 s after open failure,
//!                                    1.5 s after a lost session)
//! ```
//!
//! Every successful open emits `HardwareReset` and then
//! `Status{connected: true}`, and starts the decoder from an empty buffer.
//! Subscriber-visible status events are de-duplicated: repeated open failures
//! with the same message are reported once.
//!
//! # Transport seam
//!
//! [`DeviceConnector`] opens sessions.  A session is a byte-event channel
//! plus a [`CommandWriter`].  The serial implementation lives in
//! `infrastructure::serial`; [`mock`] provides a scriptable in-memory one.

pub mod mock;
pub mod scheduler;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use elcb_core::{DeviceCommand, FrameDecoder, SyntheticEvent};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, timeout, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::application::DevicePort;
use crate::domain::{AttemptOutcome, BridgeConfig, CommandError, LinkError, LinkEvent, LinkStatus, RetryPolicy};

pub use scheduler::RetryScheduler;

/// How often the actor checks the shutdown flag.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Depth of the handle → actor command channel.
const COMMAND_CHANNEL_DEPTH: usize = 8;

/// One read from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Bytes received, in arrival order.
    Data(Vec<u8>),
    /// The transport failed; the session is over.
    Error(String),
}

/// Write side of an open session.
#[async_trait]
pub trait CommandWriter: Send {
    /// Writes a single byte and flushes it to the device.
    async fn write_byte(&mut self, byte: u8) -> io::Result<()>;
}

/// An open device session.
///
/// The session has ended when `events` yields `TransportEvent::Error` or
/// closes.
pub struct DeviceConnection {
    pub events: mpsc::Receiver<TransportEvent>,
    pub writer: Box<dyn CommandWriter>,
}

/// Opens device sessions.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn open(&self) -> Result<DeviceConnection, LinkError>;

    /// Human-readable endpoint name for logs.
    fn endpoint(&self) -> String;
}

/// Tunables for the link manager, taken from [`BridgeConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub retry: RetryPolicy,
    pub write_timeout: Duration,
    pub max_line_bytes: usize,
}

impl From<&BridgeConfig> for LinkSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            retry: config.retry,
            write_timeout: config.write_timeout,
            max_line_bytes: config.max_line_bytes,
        }
    }
}

struct CommandRequest {
    command: DeviceCommand,
    reply: oneshot::Sender<Result<(), CommandError>>,
}

/// How an open attempt ended.
enum OpenOutcome {
    Opened(DeviceConnection),
    Failed,
    Shutdown,
}

/// How a session ended.
enum SessionEnd {
    Lost(Option<String>),
    Shutdown,
}

/// Cloneable client side of the link manager.
#[derive(Clone)]
pub struct DeviceLinkHandle {
    commands: mpsc::Sender<CommandRequest>,
    status: watch::Receiver<LinkStatus>,
}

#[async_trait]
impl DevicePort for DeviceLinkHandle {
    async fn send_command(&self, command: DeviceCommand) -> Result<(), CommandError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(CommandRequest { command, reply })
            .await
            .map_err(|_| CommandError::LinkClosed)?;
        response.await.map_err(|_| CommandError::LinkClosed)?
    }

    fn link_status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }
}

/// The link actor.  Create with [`DeviceLinkManager::new`], then spawn
/// [`DeviceLinkManager::run`].
pub struct DeviceLinkManager {
    connector: Arc<dyn DeviceConnector>,
    settings: LinkSettings,
    events: mpsc::Sender<LinkEvent>,
    commands: mpsc::Receiver<CommandRequest>,
    status: watch::Sender<LinkStatus>,
    decoder: FrameDecoder,
    scheduler: RetryScheduler,
    /// Last `(connected, error)` pair sent to the controller.
    published: Option<(bool, Option<String>)>,
    running: Arc<AtomicBool>,
    shutdown_tick: Interval,
}

impl DeviceLinkManager {
    /// Must be called from within a Tokio runtime.
    pub fn new(
        connector: Arc<dyn DeviceConnector>,
        settings: LinkSettings,
        events: mpsc::Sender<LinkEvent>,
        running: Arc<AtomicBool>,
    ) -> (Self, DeviceLinkHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_CHANNEL_DEPTH);
        let (status, status_rx) = watch::channel(LinkStatus::default());

        let mut shutdown_tick = interval(SHUTDOWN_POLL_INTERVAL);
        shutdown_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let manager = Self {
            connector,
            settings,
            events,
            commands,
            status,
            decoder: FrameDecoder::with_max_line_bytes(settings.max_line_bytes),
            scheduler: RetryScheduler::new(),
            published: None,
            running,
            shutdown_tick,
        };
        let handle = DeviceLinkHandle {
            commands: commands_tx,
            status: status_rx,
        };
        (manager, handle)
    }

    /// Runs until the shutdown flag clears or every handle is dropped.
    pub async fn run(mut self) {
        info!("device link started for {}", self.connector.endpoint());
        self.scheduler.schedule(Duration::ZERO);

        loop {
            tokio::select! {
                _ = self.scheduler.fired() => {
                    let outcome = match self.open_session().await {
                        OpenOutcome::Opened(connection) => match self.run_session(connection).await {
                            SessionEnd::Lost(error) => {
                                self.publish(LinkStatus::Disconnected { error }).await;
                                AttemptOutcome::SessionEnded
                            }
                            SessionEnd::Shutdown => break,
                        },
                        OpenOutcome::Failed => AttemptOutcome::OpenFailed,
                        OpenOutcome::Shutdown => break,
                    };
                    let delay = self.settings.retry.delay_after(outcome);
                    debug!("next open attempt in {delay:?}");
                    self.scheduler.schedule(delay);
                }
                request = self.commands.recv() => match request {
                    Some(request) => reject(request),
                    None => break,
                },
                _ = self.shutdown_tick.tick() => {
                    if !self.running.load(Ordering::Relaxed) {
                        break;
                    }
                }
            }
        }

        self.scheduler.cancel();
        info!("device link stopped");
    }

    /// Runs one open attempt.  Commands that arrive meanwhile are rejected,
    /// never held for the session being opened.
    async fn open_session(&mut self) -> OpenOutcome {
        self.publish(LinkStatus::Connecting).await;

        let connector = Arc::clone(&self.connector);
        let open = connector.open();
        tokio::pin!(open);

        let result = loop {
            tokio::select! {
                result = &mut open => break result,
                request = self.commands.recv() => match request {
                    Some(request) => reject(request),
                    None => return OpenOutcome::Shutdown,
                },
                _ = self.shutdown_tick.tick() => {
                    if !self.running.load(Ordering::Relaxed) {
                        return OpenOutcome::Shutdown;
                    }
                }
            }
        };

        match result {
            Ok(connection) => {
                info!("device link connected to {}", connector.endpoint());
                self.decoder.reset();
                self.emit(LinkEvent::HardwareReset).await;
                self.publish(LinkStatus::Connected).await;
                OpenOutcome::Opened(connection)
            }
            Err(e) => {
                warn!("{e}");
                self.publish(LinkStatus::Disconnected {
                    error: Some(e.reason().to_string()),
                })
                .await;
                OpenOutcome::Failed
            }
        }
    }

    async fn run_session(&mut self, mut connection: DeviceConnection) -> SessionEnd {
        loop {
            tokio::select! {
                event = connection.events.recv() => match event {
                    Some(TransportEvent::Data(bytes)) => {
                        for frame in self.decoder.push(&bytes) {
                            trace!("device frame: {}", frame.record.kind());
                            if self.events.send(LinkEvent::Frame(frame)).await.is_err() {
                                debug!("controller gone; dropping device frame");
                            }
                        }
                    }
                    Some(TransportEvent::Error(message)) => {
                        warn!("device link error: {message}");
                        return SessionEnd::Lost(Some(message));
                    }
                    None => {
                        info!("device link closed by transport");
                        return SessionEnd::Lost(None);
                    }
                },
                request = self.commands.recv() => match request {
                    Some(CommandRequest { command, reply }) => {
                        let result = self.write_command(connection.writer.as_mut(), command).await;
                        let _ = reply.send(result);
                    }
                    None => return SessionEnd::Shutdown,
                },
                _ = self.shutdown_tick.tick() => {
                    if !self.running.load(Ordering::Relaxed) {
                        return SessionEnd::Shutdown;
                    }
                }
            }
        }
    }

    /// Writes one command, bounded by the write timeout.
    ///
    /// Failures go back to the caller only.  The session stays open; if the
    /// transport is really gone its read side ends the session.
    async fn write_command(
        &mut self,
        writer: &mut dyn CommandWriter,
        command: DeviceCommand,
    ) -> Result<(), CommandError> {
        let byte = command.as_byte();
        match timeout(self.settings.write_timeout, writer.write_byte(byte)).await {
            Ok(Ok(())) => {
                info!("sent {command:?} ({:?}) to device", byte as char);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("write of {command:?} failed: {e}");
                Err(CommandError::WriteFailed(e.to_string()))
            }
            Err(_) => {
                warn!(
                    "write of {command:?} timed out after {:?}",
                    self.settings.write_timeout
                );
                Err(CommandError::Timeout(self.settings.write_timeout))
            }
        }
    }

    /// Records a status change and forwards it upward unless it repeats the
    /// last published `(connected, error)` pair.
    async fn publish(&mut self, status: LinkStatus) {
        let event = status.to_status_event();
        self.status.send_replace(status);

        let Some(SyntheticEvent::SerialStatus { connected, error }) = event else {
            return;
        };
        let pair = (connected, error);
        if self.published.as_ref() == Some(&pair) {
            trace!("suppressing repeated status {pair:?}");
            return;
        }
        self.published = Some(pair.clone());
        let (connected, error) = pair;
        self.emit(LinkEvent::Status { connected, error }).await;
    }

    async fn emit(&mut self, event: LinkEvent) {
        if self.events.send(event).await.is_err() {
            debug!("controller gone; dropping link event");
        }
    }
}

fn reject(request: CommandRequest) {
    trace!("{:?} rejected: no session", request.command);
    let _ = request.reply.send(Err(CommandError::NotConnected));
}

// ── Tests ─────────────────────────────────────────────────────────────────────
