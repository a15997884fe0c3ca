//! HTTP control API.
//!
//! | Method | Path          | Purpose                                   |
//! |--------|---------------|-------------------------------------------|
//! | GET    | `/health`     | Liveness probe, always `ok`               |
//! | POST   | `/api/reset`  | Send the reset command to the device      |
//! | GET    | `/api/ports`  | List serial endpoints on this host        |
//! | GET    | `/api/status` | Link state and subscriber count           |
//!
//! `POST /api/reset` answers `200 {"success":true}` or an error status with
//! `{"success":false,"reason":...,"message":...}`:
//!
//! | Reason          | Status |
//! |-----------------|--------|
//! | `not-connected` | 503    |
//! | `write-failed`  | 502    |
//! | `write-timeout` | 504    |
//! | `link-closed`   | 503    |

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use axum::{extract::State, http::StatusCode, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::application::BridgeHandle;
use crate::domain::{CommandError, PortDescriptor};
use crate::infrastructure::serial::PortListError;

/// How often the server checks the shutdown flag.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Source of the port list; the serial implementation in production.
pub type PortLister = Arc<dyn Fn() -> Result<Vec<PortDescriptor>, PortListError> + Send + Sync>;

#[derive(Clone)]
pub struct ApiState {
    pub bridge: BridgeHandle,
    pub list_ports: PortLister,
    /// Configured serial path, echoed by `/api/status`.
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// `connected`, `connecting` or `disconnected`.
    pub link: String,
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub endpoint: String,
    pub clients: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/reset", post(trigger_reset))
        .route("/api/ports", get(list_ports))
        .route("/api/status", get(link_status))
        .with_state(state)
}

/// Serves the API on `listener` until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the server fails while running.
pub async fn serve(listener: TcpListener, state: ApiState, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP control API listening on {addr}");
    }
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(wait_for_shutdown(running))
        .await
        .context("HTTP control API failed")
}

async fn wait_for_shutdown(running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
    }
    info!("shutdown flag set; stopping HTTP control API");
}

pub async fn trigger_reset(State(state): State<ApiState>) -> (StatusCode, Json<ResetResponse>) {
    match state.bridge.trigger_reset().await {
        Ok(()) => {
            info!("reset sent via HTTP API");
            (
                StatusCode::OK,
                Json(ResetResponse {
                    success: true,
                    reason: None,
                    message: None,
                }),
            )
        }
        Err(e) => {
            warn!("HTTP reset failed: {e}");
            (
                status_for(&e),
                Json(ResetResponse {
                    success: false,
                    reason: Some(e.reason().to_string()),
                    message: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn list_ports(
    State(state): State<ApiState>,
) -> Result<Json<Vec<PortDescriptor>>, (StatusCode, Json<ErrorBody>)> {
    let lister = Arc::clone(&state.list_ports);
    let result = tokio::task::spawn_blocking(move || lister())
        .await
        .map_err(|e| internal_error(e.to_string()))?;

    match result {
        Ok(ports) => Ok(Json(ports)),
        Err(e) => {
            warn!("{e}");
            Err(internal_error(e.to_string()))
        }
    }
}

pub async fn link_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let status = state.bridge.link_status();
    Json(StatusResponse {
        link: status.as_str().to_string(),
        connected: status.is_connected(),
        error: status.error().map(str::to_string),
        endpoint: state.endpoint.clone(),
        clients: state.bridge.client_count(),
    })
}

fn status_for(error: &CommandError) -> StatusCode {
    match error {
        CommandError::NotConnected | CommandError::LinkClosed => StatusCode::SERVICE_UNAVAILABLE,
        CommandError::WriteFailed(_) => StatusCode::BAD_GATEWAY,
        CommandError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
    }
}

fn internal_error(error: String) -> (StatusCode, Json<ErrorBody>) {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
