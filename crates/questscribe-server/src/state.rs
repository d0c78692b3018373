//! Shared application state for the command surface.
//!
//! [`AppState`] owns the single [`Project`] behind a
//! [`tokio::sync::RwLock`]: every mutating command takes the write lock for
//! the duration of one call, and state queries share the read lock. File
//! I/O never happens while the project lock is held.
//!
//! Document commands (new, save, load) also hold a separate file mutex for
//! their whole duration, so two saves never write the same path at once and
//! a save that snapshotted earlier can never land after a later one.

use std::path::PathBuf;
use std::sync::Arc;

use questscribe_persist::{LoadedProject, SourceFormat};
use questscribe_tracker::Project;
use questscribe_types::DEFAULT_ENTITY_COLOR;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::error::ApiError;

/// Where the open project lives on disk and how far it has drifted.
#[derive(Debug, Clone, Default)]
pub struct DocumentInfo {
    /// Path of the last successful save or load, if any.
    pub path: Option<PathBuf>,
    /// Project revision captured by that save or load.
    pub saved_revision: u64,
}

/// Summary returned by `GET /api/document/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentStatus {
    /// Path of the last save or load.
    pub path: Option<PathBuf>,
    /// Whether the project changed since then.
    pub dirty: bool,
    /// Current project revision.
    pub revision: u64,
    /// Number of entities.
    pub entities: usize,
    /// Number of markers.
    pub markers: usize,
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor. Lock order
/// is always `file` before `project` before `document`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The open project.
    pub project: Arc<RwLock<Project>>,
    /// Save/load bookkeeping for dirty tracking.
    pub document: Arc<RwLock<DocumentInfo>>,
    /// Serializes document commands.
    file: Arc<Mutex<()>>,
    /// Color given to entities created without one.
    pub default_entity_color: String,
}

impl AppState {
    /// Create a new application state with an empty project.
    pub fn new() -> Self {
        Self {
            project: Arc::new(RwLock::new(Project::new())),
            document: Arc::new(RwLock::new(DocumentInfo::default())),
            file: Arc::new(Mutex::new(())),
            default_entity_color: String::from(DEFAULT_ENTITY_COLOR),
        }
    }

    /// Use `color` for entities created without an explicit color.
    #[must_use]
    pub fn with_default_entity_color(mut self, color: impl Into<String>) -> Self {
        self.default_entity_color = color.into();
        self
    }

    /// Report the open document's path and dirty flag.
    pub async fn status(&self) -> DocumentStatus {
        let project = self.project.read().await;
        let document = self.document.read().await;
        DocumentStatus {
            path: document.path.clone(),
            dirty: project.revision() != document.saved_revision,
            revision: project.revision(),
            entities: project.entities().len(),
            markers: project.markers().len(),
        }
    }

    /// Discard the open project and start an empty one.
    pub async fn new_document(&self) {
        let _file = self.file.lock().await;
        let mut project = self.project.write().await;
        project.clear();
        let mut document = self.document.write().await;
        *document = DocumentInfo {
            path: None,
            saved_revision: project.revision(),
        };
    }

    /// Save the open project to `path`.
    ///
    /// A snapshot is taken under the read lock; the file is written on the
    /// blocking pool after the lock is released. Concurrent saves queue on
    /// the file mutex and finish in the order they snapshotted.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Io`] if the file cannot be written.
    pub async fn save_to(&self, path: PathBuf, document_payload: String) -> Result<(), ApiError> {
        let _file = self.file.lock().await;
        let (snapshot, revision) = {
            let project = self.project.read().await;
            (project.snapshot(), project.revision())
        };

        let target = path.clone();
        tokio::task::spawn_blocking(move || {
            questscribe_persist::save(&target, snapshot, document_payload)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("save task failed: {e}")))??;

        let mut document = self.document.write().await;
        *document = DocumentInfo {
            path: Some(path),
            saved_revision: revision,
        };
        Ok(())
    }

    /// Load a project file and replace the open project with it.
    ///
    /// The file is read and validated on the blocking pool; only the final
    /// swap takes the write lock, so a failed load changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Io`] for unreadable files and
    /// [`ApiError::Format`] for invalid contents.
    pub async fn load_from(&self, path: PathBuf) -> Result<LoadedDocument, ApiError> {
        let _file = self.file.lock().await;
        let source = path.clone();
        let loaded: LoadedProject =
            tokio::task::spawn_blocking(move || questscribe_persist::load(&source))
                .await
                .map_err(|e| ApiError::Internal(format!("load task failed: {e}")))??;

        let summary = LoadedDocument {
            entities: loaded.project.list_entities(),
            markers: loaded.project.list_markers(None),
            document_payload: loaded.document_payload,
            repaired_fields: loaded.repaired_fields,
            source_format: loaded.source_format,
        };

        let mut project = self.project.write().await;
        *project = loaded.project;
        let mut document = self.document.write().await;
        *document = DocumentInfo {
            path: Some(path),
            saved_revision: project.revision(),
        };
        info!(
            entities = summary.entities.len(),
            markers = summary.markers.len(),
            "project swapped in"
        );
        Ok(summary)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Response body of `POST /api/document/load`.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedDocument {
    /// Every entity of the loaded project.
    pub entities: Vec<questscribe_types::Entity>,
    /// Every marker in document order.
    pub markers: Vec<questscribe_types::Marker>,
    /// The editor document exactly as saved.
    pub document_payload: String,
    /// Schema entries re-registered during load.
    pub repaired_fields: usize,
    /// Whether the file was current or first-release.
    pub source_format: SourceFormat,
}
