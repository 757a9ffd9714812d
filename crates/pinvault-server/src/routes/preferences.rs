//! Preference routes: `/v1/preferences`. Session required.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/preferences` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(read).put(update))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreferencesBody {
    pub autosave: bool,
}

async fn read(State(state): State<Arc<AppState>>) -> Result<Json<PreferencesBody>, AppError> {
    Ok(Json(PreferencesBody {
        autosave: state.preferences.autosave().await?,
    }))
}

async fn update(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PreferencesBody>,
) -> Result<Json<PreferencesBody>, AppError> {
    state.preferences.set_autosave(body.autosave).await?;
    Ok(Json(body))
}
