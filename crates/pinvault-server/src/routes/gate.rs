//! PIN gate routes: `/v1/gate/*`
//!
//! One endpoint takes every PIN entry; what it does depends on the gate's
//! current phase, which `GET /status` reports along with any live notice.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use pinvault_core::gate::{GateOutcome, GatePhase, Notice};

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/gate` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(status))
        .route("/pin", post(submit_pin))
        .route("/change", post(begin_change))
        .route("/cancel", post(cancel))
        .route("/logout", post(logout))
        .route("/activity", post(activity))
}

// ── Request / Response types ─────────────────────────────────────────

/// Request body for `POST /v1/gate/pin`.
#[derive(Deserialize)]
pub struct PinRequest {
    pub pin: String,
}

impl std::fmt::Debug for PinRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinRequest").finish_non_exhaustive()
    }
}

/// Response body for `GET /v1/gate/status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub phase: GatePhase,
    pub notice: Option<Notice>,
    /// Whole seconds until the idle session is revoked.
    pub session_expires_in_secs: Option<u64>,
}

/// Response body for `POST /v1/gate/activity`.
#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    pub active: bool,
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, AppError> {
    let status = state.gate.status().await?;
    Ok(Json(StatusResponse {
        phase: status.phase,
        notice: status.notice,
        session_expires_in_secs: status.session_expires_in.map(|d| d.as_secs()),
    }))
}

async fn submit_pin(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PinRequest>,
) -> Result<Json<GateOutcome>, AppError> {
    Ok(Json(state.gate.submit_pin(&body.pin).await?))
}

async fn begin_change(State(state): State<Arc<AppState>>) -> Result<Json<GateOutcome>, AppError> {
    Ok(Json(state.gate.begin_pin_change().await?))
}

async fn cancel(State(state): State<Arc<AppState>>) -> Result<Json<GateOutcome>, AppError> {
    Ok(Json(state.gate.cancel().await?))
}

async fn logout(State(state): State<Arc<AppState>>) -> Result<Json<GateOutcome>, AppError> {
    Ok(Json(state.gate.logout().await?))
}

/// Report user interaction so the inactivity watchdog is rearmed.
async fn activity(State(state): State<Arc<AppState>>) -> Result<Json<ActivityResponse>, AppError> {
    let active = state.gate.record_activity().await?;
    Ok(Json(ActivityResponse { active }))
}
