//! WebSocket server: accept loop and per-subscriber session tasks.
//!
//! This module is responsible for:
//!
//! 1. Accepting TCP connections on the already-bound subscriber listener.
//! 2. Upgrading each connection to a WebSocket session.
//! 3. Registering the session with the bridge controller.
//! 4. Running two concurrent halves per session:
//!    - **Writer**: drains the subscriber's outbound queue into the socket,
//!      each write bounded by `send_timeout`.
//!    - **Reader**: forwards text frames to the controller as commands.
//! 5. Unregistering the session when either half finishes.
//! 6. Stopping the accept loop when the `running` flag is cleared.
//!
//! # Back-pressure
//!
//! The controller never writes to a socket.  It queues frames on the
//! subscriber's bounded channel; if the writer falls `queue_depth` frames
//! behind, the controller drops the subscriber and its queue closes, which
//! ends the writer and closes the socket.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use crate::application::{BridgeHandle, ClientHandle};
use crate::domain::BridgeConfig;

/// How long `accept` waits before re-checking the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Per-subscriber limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub queue_depth: usize,
    pub send_timeout: Duration,
}

impl From<&BridgeConfig> for SessionSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            queue_depth: config.client_queue_depth,
            send_timeout: config.client_send_timeout,
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Runs the subscriber accept loop until `running` is set to `false`.
///
/// Each accepted connection is handed off to a dedicated Tokio task so that
/// one slow subscriber never blocks others.
///
/// # Errors
///
/// Currently never fails once the listener is bound; accept errors are
/// logged and the loop continues.
pub async fn run_server(
    listener: TcpListener,
    bridge: BridgeHandle,
    settings: SessionSettings,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("WebSocket server listening on {addr}");
    }

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping WebSocket accept loop");
            break;
        }

        match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new subscriber connection from {peer_addr}");
                let bridge = bridge.clone();
                tokio::spawn(async move {
                    handle_subscriber_session(stream, peer_addr, bridge, settings).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_subscriber_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    bridge: BridgeHandle,
    settings: SessionSettings,
) {
    match run_session(raw_stream, peer_addr, bridge, settings).await {
        Ok(()) => info!("subscriber {peer_addr} closed"),
        Err(e) => warn!("subscriber {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs one subscriber from handshake to close.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails or the controller has
/// stopped.
async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    bridge: BridgeHandle,
    settings: SessionSettings,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (handle, mut outbound) = ClientHandle::channel(settings.queue_depth);
    let id = handle.id();
    info!("subscriber {id} connected from {peer_addr}");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    bridge
        .client_connected(handle)
        .await
        .context("bridge controller is not running")?;

    // ── Writer: outbound queue → socket ───────────────────────────────────────
    let send_timeout = settings.send_timeout;
    let mut writer_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            match timeout(send_timeout, ws_tx.send(WsMessage::Text(frame))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("subscriber {id}: send failed: {e}");
                    return;
                }
                Err(_) => {
                    warn!("subscriber {id}: send timed out after {send_timeout:?}");
                    return;
                }
            }
        }
        // Queue closed: the controller dropped this subscriber.
        let _ = timeout(send_timeout, ws_tx.close()).await;
    });

    // ── Reader: socket → controller ──────────────────────────────────────────
    let reader_bridge = bridge.clone();
    let reader = async move {
        loop {
            let message = match ws_rx.next().await {
                Some(Ok(message)) => message,
                Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                    debug!("subscriber {id}: WebSocket closed");
                    break;
                }
                Some(Err(e)) => {
                    warn!("subscriber {id}: WebSocket error: {e}");
                    break;
                }
                None => break,
            };

            match message {
                WsMessage::Text(text) => {
                    if reader_bridge.client_text(id, text).await.is_err() {
                        break;
                    }
                }
                WsMessage::Close(_) => {
                    debug!("subscriber {id}: Close frame received");
                    break;
                }
                other => debug!("subscriber {id}: ignoring {} frame", frame_kind(&other)),
            }
        }
    };

    tokio::select! {
        _ = &mut writer_task => debug!("subscriber {id}: writer ended"),
        _ = reader => debug!("subscriber {id}: reader ended"),
    }
    writer_task.abort();

    // The controller may already have dropped a stalled subscriber.
    let _ = bridge.client_disconnected(id).await;
    Ok(())
}

// ── Helper ────────────────────────────────────────────────────────────────────

/// Short frame-type name for log messages.
fn frame_kind(message: &WsMessage) -> &'static str {
    match message {
        WsMessage::Text(_) => "text",
        WsMessage::Binary(_) => "binary",
        WsMessage::Ping(_) => "ping",
        WsMessage::Pong(_) => "pong",
        WsMessage::Close(_) => "close",
        WsMessage::Frame(_) => "raw",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
