//! In-memory device transport for tests.
//!
//! [`MockConnector`] hands every successfully opened session to the test as
//! a [`MockDevice`], which can feed bytes to the bridge, fail or close the
//! session, and report what the bridge wrote.  Open failures, slow opens and
//! stalled writes can be scripted.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{CommandWriter, DeviceConnection, DeviceConnector, TransportEvent};
use crate::domain::LinkError;

const MOCK_ENDPOINT: &str = "mock://elcb";

#[derive(Default)]
struct Script {
    failures_remaining: usize,
    failure_message: String,
    stall_writes: bool,
    open_delay: Duration,
    open_attempts: usize,
}

/// A scriptable [`DeviceConnector`].
pub struct MockConnector {
    script: Arc<Mutex<Script>>,
    sessions: mpsc::UnboundedSender<MockDevice>,
}

impl MockConnector {
    /// Creates a connector that opens successfully by default.
    ///
    /// Each opened session is delivered on the returned receiver.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockDevice>) {
        let (sessions, rx) = mpsc::unbounded_channel();
        let connector = Self {
            script: Arc::new(Mutex::new(Script::default())),
            sessions,
        };
        (connector, rx)
    }

    /// Makes the next `count` open attempts fail with `message`.
    pub fn fail_next(&self, count: usize, message: &str) {
        let mut script = self.script.lock().expect("lock poisoned");
        script.failures_remaining = count;
        script.failure_message = message.to_string();
    }

    /// When set, writes on sessions opened afterwards never complete.
    pub fn set_stall_writes(&self, stall: bool) {
        self.script.lock().expect("lock poisoned").stall_writes = stall;
    }

    /// Makes every later open attempt take `delay` before it resolves.
    pub fn set_open_delay(&self, delay: Duration) {
        self.script.lock().expect("lock poisoned").open_delay = delay;
    }

    /// Number of times `open` has been called.
    pub fn open_attempts(&self) -> usize {
        self.script.lock().expect("lock poisoned").open_attempts
    }
}

#[async_trait]
impl DeviceConnector for MockConnector {
    async fn open(&self) -> Result<DeviceConnection, LinkError> {
        let open_delay = {
            let mut script = self.script.lock().expect("lock poisoned");
            script.open_attempts += 1;
            script.open_delay
        };
        if !open_delay.is_zero() {
            tokio::time::sleep(open_delay).await;
        }

        let stall_writes = {
            let mut script = self.script.lock().expect("lock poisoned");
            if script.failures_remaining > 0 {
                script.failures_remaining -= 1;
                return Err(LinkError::Open {
                    endpoint: MOCK_ENDPOINT.to_string(),
                    reason: script.failure_message.clone(),
                });
            }
            script.stall_writes
        };

        let (events_tx, events) = mpsc::channel(64);
        let written = Arc::new(Mutex::new(Vec::new()));
        let device = MockDevice {
            events: events_tx,
            written: Arc::clone(&written),
        };
        // The test may not care about sessions.
        let _ = self.sessions.send(device);

        Ok(DeviceConnection {
            events,
            writer: Box::new(MockWriter {
                written,
                stall_writes,
            }),
        })
    }

    fn endpoint(&self) -> String {
        MOCK_ENDPOINT.to_string()
    }
}

/// The device end of one mock session.
pub struct MockDevice {
    events: mpsc::Sender<TransportEvent>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl MockDevice {
    /// Delivers raw bytes as one read.  Returns `false` if the session is
    /// already gone.
    pub async fn send_bytes(&self, bytes: &[u8]) -> bool {
        self.events
            .send(TransportEvent::Data(bytes.to_vec()))
            .await
            .is_ok()
    }

    /// Delivers `line` followed by `\n`.
    pub async fn send_line(&self, line: &str) -> bool {
        self.send_bytes(format!("{line}\n").as_bytes()).await
    }

    /// Ends the session with a transport error.
    pub async fn fail(self, message: &str) {
        let _ = self
            .events
            .send(TransportEvent::Error(message.to_string()))
            .await;
    }

    /// Ends the session as if the device was unplugged cleanly.
    pub fn close(self) {}

    /// Every byte the bridge has written on this session.
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().expect("lock poisoned").clone()
    }
}

struct MockWriter {
    written: Arc<Mutex<Vec<u8>>>,
    stall_writes: bool,
}

#[async_trait]
impl CommandWriter for MockWriter {
    async fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        if self.stall_writes {
            std::future::pending::<()>().await;
        }
        self.written.lock().expect("lock poisoned").push(byte);
        Ok(())
    }
}
