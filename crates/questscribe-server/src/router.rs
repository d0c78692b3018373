//! Axum router construction for the command surface.
//!
//! Assembles every command route into a single [`Router`] with CORS
//! enabled so the editor, served from its own origin, can reach it.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::document;
use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /health` -- liveness check
/// - `GET|POST /api/entities` -- list / create entities
/// - `PUT|DELETE /api/entities/{id}` -- update / delete (with cascade)
/// - `POST /api/entities/{id}/duplicate` -- template copy
/// - `POST /api/entities/{id}/fields/delete` -- global field deletion
/// - `GET /api/entities/{id}/state` -- computed state at `?position=`
/// - `GET|POST /api/markers` -- list / insert markers
/// - `PATCH|DELETE /api/markers/{id}` -- update / delete a marker
/// - `POST /api/markers/positions` -- batch reposition
/// - `POST /api/document/{new,save,load}`, `GET /api/document/status`
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        // Entities
        .route(
            "/api/entities",
            get(handlers::list_entities).post(handlers::create_entity),
        )
        .route(
            "/api/entities/{id}",
            put(handlers::update_entity).delete(handlers::delete_entity),
        )
        .route(
            "/api/entities/{id}/duplicate",
            post(handlers::duplicate_entity),
        )
        .route(
            "/api/entities/{id}/fields/delete",
            post(handlers::delete_field),
        )
        .route("/api/entities/{id}/state", get(handlers::entity_state))
        // Markers
        .route(
            "/api/markers",
            get(handlers::list_markers).post(handlers::insert_marker),
        )
        .route(
            "/api/markers/positions",
            post(handlers::reposition_markers),
        )
        .route(
            "/api/markers/{id}",
            patch(handlers::update_marker).delete(handlers::delete_marker),
        )
        // Document lifecycle
        .route("/api/document/new", post(document::new_document))
        .route("/api/document/save", post(document::save_document))
        .route("/api/document/load", post(document::load_document))
        .route("/api/document/status", get(document::document_status))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
