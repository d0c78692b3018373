//! Command handlers for entities, markers, and state queries.
//!
//! Every handler maps to one editor command and holds the project lock for
//! exactly that command. Request bodies are parsed with the rejection
//! captured so malformed input surfaces as a `validation` error in the
//! standard error body.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Liveness check |
//! | `GET` | `/api/entities` | List entities |
//! | `POST` | `/api/entities` | Create an entity |
//! | `PUT` | `/api/entities/{id}` | Rename or recolor |
//! | `DELETE` | `/api/entities/{id}` | Delete with cascade |
//! | `POST` | `/api/entities/{id}/duplicate` | Copy as template |
//! | `POST` | `/api/entities/{id}/fields/delete` | Delete a field everywhere |
//! | `GET` | `/api/entities/{id}/state` | State at `?position=` |
//! | `GET` | `/api/markers` | List markers (`?entity_id=`) |
//! | `POST` | `/api/markers` | Insert a marker |
//! | `PATCH` | `/api/markers/{id}` | Update a marker |
//! | `DELETE` | `/api/markers/{id}` | Delete a marker |
//! | `POST` | `/api/markers/positions` | Batch reposition |

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use questscribe_tracker::{MarkerUpdate, NewMarker, RepositionUpdate};
use questscribe_types::{EntityId, FieldChange, FieldPath, MarkerId, MarkerVisual};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request bodies and query parameters
// ---------------------------------------------------------------------------

/// Body of `POST /api/entities`.
#[derive(Debug, serde::Deserialize)]
pub struct CreateEntityRequest {
    /// Display name.
    pub name: String,
    /// Hex color; the configured default when absent.
    pub color: Option<String>,
}

/// Body of `PUT /api/entities/{id}`.
#[derive(Debug, serde::Deserialize)]
pub struct UpdateEntityRequest {
    /// New display name.
    pub name: String,
    /// New hex color.
    pub color: String,
}

/// Body of `POST /api/entities/{id}/duplicate`.
#[derive(Debug, serde::Deserialize)]
pub struct DuplicateEntityRequest {
    /// Name of the copy.
    pub new_name: String,
}

/// Body of `POST /api/entities/{id}/fields/delete`.
#[derive(Debug, serde::Deserialize)]
pub struct DeleteFieldRequest {
    /// Dotted field path, e.g. `stats.HP`.
    pub path: String,
}

/// Query of `GET /api/entities/{id}/state`.
#[derive(Debug, serde::Deserialize)]
pub struct StateQuery {
    /// Character offset to compute the state at.
    pub position: u64,
}

/// Body of `POST /api/markers`.
#[derive(Debug, serde::Deserialize)]
pub struct InsertMarkerRequest {
    /// Owning entity.
    pub entity_id: EntityId,
    /// Character offset.
    pub position: u64,
    /// Changes, applied in order.
    pub changes: Vec<FieldChange>,
    /// Margin icon and color.
    #[serde(default)]
    pub visual: MarkerVisual,
    /// Optional note.
    #[serde(default)]
    pub description: Option<String>,
}

/// Body of `PATCH /api/markers/{id}`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct UpdateMarkerRequest {
    /// Reassign to this entity.
    #[serde(default)]
    pub entity_id: Option<EntityId>,
    /// Replace the change list.
    #[serde(default)]
    pub changes: Option<Vec<FieldChange>>,
    /// Replace the visual.
    #[serde(default)]
    pub visual: Option<MarkerVisual>,
    /// Replace the description; an empty string clears it.
    #[serde(default)]
    pub description: Option<String>,
}

/// Body of `POST /api/markers/positions`.
#[derive(Debug, serde::Deserialize)]
pub struct RepositionRequest {
    /// New positions after a document edit.
    pub updates: Vec<RepositionUpdate>,
}

/// Query of `GET /api/markers`.
#[derive(Debug, serde::Deserialize)]
pub struct MarkersQuery {
    /// Only list markers of this entity.
    pub entity_id: Option<String>,
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Liveness check.
#[allow(clippy::unused_async)]
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// List every entity, oldest first.
pub async fn list_entities(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let project = state.project.read().await;
    let entities = project.list_entities();
    Json(serde_json::json!({
        "count": entities.len(),
        "entities": entities,
    }))
}

/// Create an entity.
pub async fn create_entity(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateEntityRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    let color = body
        .color
        .unwrap_or_else(|| state.default_entity_color.clone());
    let mut project = state.project.write().await;
    let entity = project.create_entity(&body.name, &color)?;
    Ok(Json(entity))
}

/// Rename or recolor an entity.
pub async fn update_entity(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    payload: Result<Json<UpdateEntityRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_entity_id(&id_str)?;
    let Json(body) = payload?;
    let mut project = state.project.write().await;
    let entity = project.update_entity(id, &body.name, &body.color)?;
    Ok(Json(entity))
}

/// Delete an entity and every marker it owns.
pub async fn delete_entity(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_entity_id(&id_str)?;
    let mut project = state.project.write().await;
    let deleted = project.delete_entity(id)?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "removed_markers": deleted.removed_markers,
    })))
}

/// Copy an entity's color and schema under a new name.
pub async fn duplicate_entity(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    payload: Result<Json<DuplicateEntityRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_entity_id(&id_str)?;
    let Json(body) = payload?;
    let mut project = state.project.write().await;
    let entity = project.duplicate_entity(id, &body.new_name)?;
    Ok(Json(entity))
}

/// Delete a field, and everything below it, from an entity and its markers.
pub async fn delete_field(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    payload: Result<Json<DeleteFieldRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_entity_id(&id_str)?;
    let Json(body) = payload?;
    let path = FieldPath::parse(&body.path)?;
    let mut project = state.project.write().await;
    let deleted = project.delete_field(id, &path)?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "removed_changes": deleted.removed_changes,
        "removed_known_fields": deleted.removed_known_fields,
    })))
}

/// Compute an entity's state at a document position.
pub async fn entity_state(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    query: Result<Query<StateQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_entity_id(&id_str)?;
    let Query(params) = query?;
    let project = state.project.read().await;
    let tree = project.entity_state(id, params.position)?;
    Ok(Json(tree))
}

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

/// List markers in document order, optionally for one entity.
pub async fn list_markers(
    State(state): State<Arc<AppState>>,
    query: Result<Query<MarkersQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = query?;
    let entity_filter = params
        .entity_id
        .as_deref()
        .map(parse_entity_id)
        .transpose()?;
    let project = state.project.read().await;
    let markers = project.list_markers(entity_filter);
    Ok(Json(serde_json::json!({
        "count": markers.len(),
        "markers": markers,
    })))
}

/// Insert a marker.
pub async fn insert_marker(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<InsertMarkerRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    let mut project = state.project.write().await;
    let marker = project.insert_marker(NewMarker {
        entity_id: body.entity_id,
        position: body.position,
        changes: body.changes,
        visual: body.visual,
        description: body.description,
    })?;
    Ok(Json(marker))
}

/// Update a marker's entity, changes, visual, or description.
pub async fn update_marker(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    payload: Result<Json<UpdateMarkerRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_marker_id(&id_str)?;
    let Json(body) = payload?;
    let mut project = state.project.write().await;
    let marker = project.update_marker(
        id,
        MarkerUpdate {
            entity_id: body.entity_id,
            changes: body.changes,
            visual: body.visual,
            description: body.description,
        },
    )?;
    Ok(Json(marker))
}

/// Delete a marker.
pub async fn delete_marker(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_marker_id(&id_str)?;
    let mut project = state.project.write().await;
    project.delete_marker(id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// Move markers after a document edit. Unknown ids are skipped.
pub async fn reposition_markers(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RepositionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    let mut project = state.project.write().await;
    let outcome = project.reposition_markers(&body.updates);
    if outcome.skipped > 0 {
        debug!(skipped = outcome.skipped, "reposition batch named unknown markers");
    }
    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse an entity id from a path or query string.
fn parse_entity_id(s: &str) -> Result<EntityId, ApiError> {
    s.parse::<EntityId>()
        .map_err(|e| ApiError::Validation(format!("invalid entity id {s}: {e}")))
}

/// Parse a marker id from a path string.
fn parse_marker_id(s: &str) -> Result<MarkerId, ApiError> {
    s.parse::<MarkerId>()
        .map_err(|e| ApiError::Validation(format!("invalid marker id {s}: {e}")))
}
