//! Session middleware for `PinVault`.
//!
//! Every credential and preference route goes through [`session_middleware`],
//! which asks the PIN gate to authorize the request. A successful check also
//! counts as user activity and pushes the inactivity deadline back.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::error::AppError;
use crate::state::AppState;

/// Reject the request with `401 locked` unless a session is granted.
pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    match state.gate.authorize().await {
        Ok(()) => next.run(req).await,
        Err(e) => {
            debug!(path = %req.uri().path(), "request rejected by PIN gate");
            AppError::from(e).into_response()
        }
    }
}
