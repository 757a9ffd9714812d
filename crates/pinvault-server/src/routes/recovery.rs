//! Recovery routes: `/v1/recovery/*`
//!
//! The email and answers steps hold the request open for the configured
//! recovery delay before responding.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use pinvault_core::gate::GateOutcome;
use pinvault_core::recovery::{QuestionAnswer, SECURITY_QUESTIONS};

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/recovery` router.
///
/// `PUT /questions` needs a granted session; the gate enforces that itself.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/questions", get(questions).put(register_questions))
        .route("/start", post(start))
        .route("/email", post(submit_email))
        .route("/answers", post(submit_answers))
}

// ── Request / Response types ─────────────────────────────────────────

/// Response body for `GET /v1/recovery/questions`.
#[derive(Debug, Serialize)]
pub struct QuestionsResponse {
    pub questions: &'static [&'static str],
    /// Whether answers are on file and will be checked.
    pub registered: bool,
}

/// Request body for `POST /v1/recovery/email`.
#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

/// Request body for `POST /v1/recovery/answers` and `PUT /v1/recovery/questions`.
#[derive(Debug, Deserialize)]
pub struct AnswersRequest {
    pub answers: Vec<QuestionAnswer>,
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn questions(State(state): State<Arc<AppState>>) -> Result<Json<QuestionsResponse>, AppError> {
    Ok(Json(QuestionsResponse {
        questions: &SECURITY_QUESTIONS,
        registered: state.gate.has_security_questions().await?,
    }))
}

async fn register_questions(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AnswersRequest>,
) -> Result<StatusCode, AppError> {
    state.gate.register_security_questions(&body.answers).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start(State(state): State<Arc<AppState>>) -> Result<Json<GateOutcome>, AppError> {
    Ok(Json(state.gate.begin_recovery().await?))
}

async fn submit_email(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EmailRequest>,
) -> Result<Json<GateOutcome>, AppError> {
    Ok(Json(state.gate.submit_email(&body.email).await?))
}

async fn submit_answers(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AnswersRequest>,
) -> Result<Json<GateOutcome>, AppError> {
    Ok(Json(state.gate.submit_answers(&body.answers).await?))
}
