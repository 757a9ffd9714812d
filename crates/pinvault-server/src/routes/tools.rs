//! Password tool routes: `/v1/tools/*`
//!
//! Stateless helpers for the credential form. They never touch storage and
//! do not need a session.

use std::sync::Arc;

use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use pinvault_core::strength::{self, CharsetOptions, DEFAULT_GENERATED_LENGTH, StrengthReport};

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/tools` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/strength", post(assess))
        .route("/generate", post(generate))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Deserialize)]
pub struct StrengthRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct StrengthResponse {
    #[serde(flatten)]
    pub report: StrengthReport,
    pub masked: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default = "default_length")]
    pub length: usize,
    #[serde(flatten)]
    pub charset: CharsetOptions,
}

#[derive(Serialize)]
pub struct GenerateResponse {
    pub password: String,
    pub strength: StrengthReport,
}

fn default_length() -> usize {
    DEFAULT_GENERATED_LENGTH
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn assess(Json(body): Json<StrengthRequest>) -> Json<StrengthResponse> {
    Json(StrengthResponse {
        report: strength::assess(&body.password),
        masked: strength::mask(&body.password),
    })
}

async fn generate(Json(body): Json<GenerateRequest>) -> Result<Json<GenerateResponse>, AppError> {
    let password = strength::generate(body.length, body.charset)?;
    let report = strength::assess(&password);
    Ok(Json(GenerateResponse {
        password,
        strength: report,
    }))
}
