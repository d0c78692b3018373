//! Document lifecycle handlers: new, save, load, and status.
//!
//! These are kept apart from the per-record commands in
//! [`crate::handlers`] because they replace or serialize the whole project
//! rather than a single entity or marker.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/document/new` | Clear both stores |
//! | `POST` | `/api/document/save` | Write the project file |
//! | `POST` | `/api/document/load` | Replace the project from a file |
//! | `GET` | `/api/document/status` | Path, revision, and dirty flag |

use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::IntoResponse;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Body of `POST /api/document/save`.
#[derive(Debug, serde::Deserialize)]
pub struct SaveRequest {
    /// Destination file.
    pub path: PathBuf,
    /// Editor document, stored verbatim.
    #[serde(default)]
    pub document_payload: String,
}

/// Body of `POST /api/document/load`.
#[derive(Debug, serde::Deserialize)]
pub struct LoadRequest {
    /// File to open.
    pub path: PathBuf,
}

// ---------------------------------------------------------------------------
// POST /api/document/new
// ---------------------------------------------------------------------------

/// Discard the open project and start an empty one.
pub async fn new_document(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.new_document().await;
    info!("new document started");
    Json(serde_json::json!({ "ok": true }))
}

// ---------------------------------------------------------------------------
// POST /api/document/save
// ---------------------------------------------------------------------------

/// Save the open project together with the editor's payload.
pub async fn save_document(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SaveRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    if body.path.as_os_str().is_empty() {
        return Err(ApiError::Validation(String::from("save path is empty")));
    }
    state
        .save_to(body.path.clone(), body.document_payload)
        .await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "path": body.path,
    })))
}

// ---------------------------------------------------------------------------
// POST /api/document/load
// ---------------------------------------------------------------------------

/// Replace the open project with the contents of a file.
pub async fn load_document(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoadRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    let loaded = state.load_from(body.path).await?;
    Ok(Json(loaded))
}

// ---------------------------------------------------------------------------
// GET /api/document/status
// ---------------------------------------------------------------------------

/// Report the open document's path, revision, and dirty flag.
pub async fn document_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.status().await)
}
