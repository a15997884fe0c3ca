//! Process wiring: binds listeners and runs every bridge task.
//!
//! [`BridgeService::bind`] does all the fallible setup (both listeners) up
//! front so a port conflict is reported before any task starts.
//! [`BridgeService::run`] then spawns:
//!
//! - the device link actor
//! - the bridge controller
//! - the WebSocket accept loop
//! - the HTTP control API
//!
//! and returns once the `running` flag is cleared and the servers have
//! stopped.

use std::net::SocketAddr;
use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::application::{BridgeController, BridgeHandle};
use crate::domain::{BridgeConfig, LinkEvent};
use crate::infrastructure::device_link::{DeviceConnector, DeviceLinkManager, LinkSettings};
use crate::infrastructure::http_api::{self, ApiState, PortLister};
use crate::infrastructure::serial::{self, SerialConnector};
use crate::infrastructure::ws_server::{self, SessionSettings};

/// Depth of the link → controller event channel.
const LINK_EVENT_CHANNEL_DEPTH: usize = 256;

/// How long background tasks get to finish after the servers stop.
const TASK_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A fully wired bridge that has bound its listeners but not started yet.
pub struct BridgeService {
    config: BridgeConfig,
    ws_listener: TcpListener,
    http_listener: TcpListener,
    link: DeviceLinkManager,
    link_events: mpsc::Receiver<LinkEvent>,
    controller: BridgeController,
    bridge: BridgeHandle,
    list_ports: PortLister,
}

impl BridgeService {
    /// Binds both listeners and builds the link and controller.
    ///
    /// # Errors
    ///
    /// Returns an error if either listener cannot be bound.
    pub async fn bind(
        config: BridgeConfig,
        connector: Arc<dyn DeviceConnector>,
        running: Arc<AtomicBool>,
    ) -> anyhow::Result<Self> {
        let ws_listener = TcpListener::bind(config.ws_bind_addr)
            .await
            .with_context(|| format!("failed to bind WebSocket listener on {}", config.ws_bind_addr))?;
        let http_listener = TcpListener::bind(config.http_bind_addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {}", config.http_bind_addr))?;

        let (events_tx, link_events) = mpsc::channel(LINK_EVENT_CHANNEL_DEPTH);
        let (link, link_handle) =
            DeviceLinkManager::new(connector, LinkSettings::from(&config), events_tx, running);
        let (controller, bridge) = BridgeController::new(Arc::new(link_handle));

        Ok(Self {
            config,
            ws_listener,
            http_listener,
            link,
            link_events,
            controller,
            bridge,
            list_ports: Arc::new(serial::list_ports),
        })
    }

    /// Replaces the port enumeration used by `/api/ports`.
    pub fn with_port_lister(mut self, list_ports: PortLister) -> Self {
        self.list_ports = list_ports;
        self
    }

    /// Actual WebSocket address (useful when bound to port 0).
    pub fn ws_addr(&self) -> anyhow::Result<SocketAddr> {
        self.ws_listener.local_addr().context("WebSocket listener has no address")
    }

    /// Actual HTTP address (useful when bound to port 0).
    pub fn http_addr(&self) -> anyhow::Result<SocketAddr> {
        self.http_listener.local_addr().context("HTTP listener has no address")
    }

    /// Handle for triggering resets and reading status in-process.
    pub fn handle(&self) -> BridgeHandle {
        self.bridge.clone()
    }

    /// Runs every task until `running` is cleared.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by the WebSocket or HTTP server.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        let Self {
            config,
            ws_listener,
            http_listener,
            link,
            link_events,
            controller,
            bridge,
            list_ports,
        } = self;

        let link_task = tokio::spawn(link.run());
        let controller_task = tokio::spawn(controller.run(link_events));

        let ws_task = tokio::spawn(ws_server::run_server(
            ws_listener,
            bridge.clone(),
            SessionSettings::from(&config),
            Arc::clone(&running),
        ));
        let api_state = ApiState {
            bridge,
            list_ports,
            endpoint: config.serial.path.clone(),
        };
        let http_result = http_api::serve(http_listener, api_state, Arc::clone(&running)).await;
        let ws_result = ws_task.await.context("WebSocket server task panicked")?;

        // The link stops on the same flag; the controller follows once the
        // link's event stream closes.
        for (name, task) in [("device link", link_task), ("bridge controller", controller_task)] {
            if timeout(TASK_SHUTDOWN_GRACE, task).await.is_err() {
                warn!("{name} did not stop within {TASK_SHUTDOWN_GRACE:?}");
            }
        }

        info!("bridge stopped");
        http_result.and(ws_result)
    }
}

/// Runs the bridge against the configured serial port until `running` is
/// cleared.
///
/// # Errors
///
/// Returns an error if a listener cannot be bound or a server fails.
pub async fn run_bridge(config: BridgeConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let connector = Arc::new(SerialConnector::new(config.serial.clone()));
    let service = BridgeService::bind(config, connector, Arc::clone(&running)).await?;
    service.run(running).await
}
