//! Credential routes: `/v1/credentials/*`
//!
//! All routes here sit behind the session middleware.
//!
//! Paths:
//! - `GET    /v1/credentials?search=term` — list, filtered by website or username
//! - `POST   /v1/credentials` — create
//! - `GET    /v1/credentials/{id}` — read
//! - `PUT    /v1/credentials/{id}` — replace fields in place
//! - `DELETE /v1/credentials/{id}` — delete

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use pinvault_core::record::{CredentialDraft, CredentialRecord, RecordId};
use pinvault_core::store::SaveOutcome;

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/credentials` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(read).put(update).delete(remove))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub search: String,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub records: Vec<CredentialRecord>,
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub record: CredentialRecord,
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Json<ListResponse> {
    Json(ListResponse {
        records: state.store.list(&query.search).await,
    })
}

async fn create(
    State(state): State<Arc<AppState>>,
    Json(mut draft): Json<CredentialDraft>,
) -> Result<(StatusCode, Json<RecordResponse>), AppError> {
    draft.id = None;
    let outcome = state.store.save(draft).await?;
    Ok((
        StatusCode::CREATED,
        Json(RecordResponse {
            record: outcome.record().clone(),
        }),
    ))
}

async fn read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RecordResponse>, AppError> {
    let id = parse_id(&id)?;
    let record = state
        .store
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("credential not found: {id}")))?;
    Ok(Json(RecordResponse { record }))
}

async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(mut draft): Json<CredentialDraft>,
) -> Result<Json<RecordResponse>, AppError> {
    draft.id = Some(parse_id(&id)?);
    match state.store.save(draft).await? {
        SaveOutcome::Updated(record) | SaveOutcome::Created(record) => {
            Ok(Json(RecordResponse { record }))
        }
    }
}

async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    if state.store.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("credential not found: {id}")))
    }
}

fn parse_id(raw: &str) -> Result<RecordId, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("invalid credential id: {raw}")))
}
