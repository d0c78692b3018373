//! The on-disk project file.
//!
//! One pretty-printed JSON document per project:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "saved_at": "2026-10-18T12:00:00Z",
//!   "entities": [...],
//!   "markers": [...],
//!   "document_payload": "<p>...</p>"
//! }
//! ```
//!
//! The document payload is opaque to this crate and round-trips verbatim.
//! Files without `format_version` are treated as first-release files and
//! upgraded through [`crate::legacy`].

use std::path::Path;

use chrono::{DateTime, Utc};
use questscribe_tracker::{Project, ProjectSnapshot};
use questscribe_types::{Entity, Marker};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::atomic::write_atomic;
use crate::error::PersistError;
use crate::legacy::{LegacyDocument, upgrade};

/// Version written by this build.
pub const FORMAT_VERSION: u64 = 1;

/// Serialized form of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    /// Layout version of this file.
    pub format_version: u64,
    /// When the file was written.
    pub saved_at: DateTime<Utc>,
    /// Every entity.
    pub entities: Vec<Entity>,
    /// Every marker, in insertion order.
    pub markers: Vec<Marker>,
    /// Opaque editor document, returned verbatim on load.
    #[serde(default)]
    pub document_payload: String,
}

/// Which layout a loaded file used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// The current versioned layout.
    Current,
    /// A first-release file without `format_version`.
    Legacy,
}

/// A project read back from disk.
#[derive(Debug, Clone)]
pub struct LoadedProject {
    /// The rebuilt project, at revision zero.
    pub project: Project,
    /// The editor document exactly as saved.
    pub document_payload: String,
    /// Missing schema entries re-registered during load.
    pub repaired_fields: usize,
    /// The layout the file was written in.
    pub source_format: SourceFormat,
}

/// Encode a snapshot as the bytes of a project file.
///
/// # Errors
///
/// Returns [`PersistError::Serialization`] if encoding fails.
pub fn encode(
    snapshot: ProjectSnapshot,
    document_payload: String,
    saved_at: DateTime<Utc>,
) -> Result<Vec<u8>, PersistError> {
    let file = ProjectFile {
        format_version: FORMAT_VERSION,
        saved_at,
        entities: snapshot.entities,
        markers: snapshot.markers,
        document_payload,
    };
    Ok(serde_json::to_vec_pretty(&file)?)
}

/// Write a project file atomically.
///
/// # Errors
///
/// Returns [`PersistError::Io`] if the file cannot be written; any previous
/// file at `path` is then left as it was.
pub fn save(
    path: &Path,
    snapshot: ProjectSnapshot,
    document_payload: String,
) -> Result<(), PersistError> {
    let entities = snapshot.entities.len();
    let markers = snapshot.markers.len();
    let bytes = encode(snapshot, document_payload, Utc::now())?;
    write_atomic(path, &bytes)?;
    info!(path = %path.display(), entities, markers, "project saved");
    Ok(())
}

/// Read and validate a project file.
///
/// # Errors
///
/// Returns [`PersistError::Io`] if the file cannot be read,
/// [`PersistError::UnsupportedVersion`] for an unknown `format_version`, or
/// [`PersistError::Format`] for malformed JSON or records that break the
/// store invariants.
pub fn load(path: &Path) -> Result<LoadedProject, PersistError> {
    let bytes = std::fs::read(path).map_err(|e| PersistError::io(path, e))?;
    let loaded = decode(&bytes)?;
    info!(
        path = %path.display(),
        entities = loaded.project.entities().len(),
        markers = loaded.project.markers().len(),
        format = ?loaded.source_format,
        "project loaded"
    );
    Ok(loaded)
}

/// Decode and validate the bytes of a project file.
///
/// # Errors
///
/// Same as [`load`], minus I/O.
pub fn decode(bytes: &[u8]) -> Result<LoadedProject, PersistError> {
    let value: serde_json::Value = serde_json::from_slice(bytes).map_err(format_error)?;
    let (snapshot, document_payload, source_format) = match value.get("format_version") {
        None => {
            let legacy: LegacyDocument = serde_json::from_value(value).map_err(format_error)?;
            let upgraded = upgrade(legacy, Utc::now())?;
            (
                upgraded.snapshot,
                upgraded.document_payload,
                SourceFormat::Legacy,
            )
        }
        Some(version) => {
            let version = version.as_u64().ok_or_else(|| {
                PersistError::Format(format!("format_version {version} is not an integer"))
            })?;
            if version != FORMAT_VERSION {
                return Err(PersistError::UnsupportedVersion(version));
            }
            let file: ProjectFile = serde_json::from_value(value).map_err(format_error)?;
            (
                ProjectSnapshot {
                    entities: file.entities,
                    markers: file.markers,
                },
                file.document_payload,
                SourceFormat::Current,
            )
        }
    };

    let restored =
        Project::from_snapshot(snapshot).map_err(|e| PersistError::Format(e.to_string()))?;
    if restored.repaired_fields > 0 {
        warn!(
            repaired_fields = restored.repaired_fields,
            "project file had markers using unregistered fields"
        );
    }
    Ok(LoadedProject {
        project: restored.project,
        document_payload,
        repaired_fields: restored.repaired_fields,
        source_format,
    })
}

fn format_error(err: serde_json::Error) -> PersistError {
    PersistError::Format(err.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use questscribe_tracker::NewMarker;
    use questscribe_types::{FieldChange, FieldPath, MarkerVisual};
    use tempfile::TempDir;

    use super::*;

    fn path(text: &str) -> FieldPath {
        FieldPath::parse(text).unwrap()
    }

    fn sample() -> Project {
        let mut project = Project::new();
        let hero = project.create_entity("Aria", "#f00").unwrap().id;
        for (position, change) in [
            (10, FieldChange::absolute(path("stats.HP"), 50.0)),
            (20, FieldChange::relative(path("stats.HP"), 10.0)),
            (20, FieldChange::absolute(path("inventory.weapon"), "Sword")),
        ] {
            project
                .insert_marker(NewMarker {
                    entity_id: hero,
                    position,
                    changes: vec![change],
                    visual: MarkerVisual::default(),
                    description: Some(String::from("note")),
                })
                .unwrap();
        }
        project
    }

    #[test]
    fn save_then_load_round_trips() {
        let project = sample();
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("story.json");
        let payload = String::from("{\"type\":\"doc\",\"content\":[]}");

        save(&file, project.snapshot(), payload.clone()).unwrap();
        let loaded = load(&file).unwrap();

        assert_eq!(loaded.document_payload, payload);
        assert_eq!(loaded.source_format, SourceFormat::Current);
        assert_eq!(loaded.repaired_fields, 0);
        assert_eq!(loaded.project.list_entities(), project.list_entities());
        assert_eq!(loaded.project.list_markers(None), project.list_markers(None));
        for entity in project.list_entities() {
            for position in [0, 10, 15, 20, 25] {
                assert_eq!(
                    loaded.project.entity_state(entity.id, position).unwrap(),
                    project.entity_state(entity.id, position).unwrap()
                );
            }
        }
    }

    #[test]
    fn file_carries_version_header() {
        let bytes = encode(ProjectSnapshot::default(), String::new(), Utc::now()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value.get("format_version"), Some(&serde_json::json!(1)));
        assert!(value.get("saved_at").is_some());
    }

    #[test]
    fn rejects_future_versions_and_garbage() {
        let future = serde_json::json!({
            "format_version": 7,
            "saved_at": Utc::now(),
            "entities": [],
            "markers": [],
            "document_payload": ""
        });
        assert!(matches!(
            decode(future.to_string().as_bytes()),
            Err(PersistError::UnsupportedVersion(7))
        ));
        assert!(matches!(decode(b"{not json"), Err(PersistError::Format(_))));
    }

    #[test]
    fn rejects_dangling_markers() {
        let mut snapshot = sample().snapshot();
        snapshot.entities.clear();
        let bytes = encode(snapshot, String::new(), Utc::now()).unwrap();
        let err = decode(&bytes).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn rejects_duplicate_entity_ids() {
        let mut snapshot = sample().snapshot();
        let copy = snapshot.entities.first().cloned().unwrap();
        snapshot.entities.push(copy);
        let bytes = encode(snapshot, String::new(), Utc::now()).unwrap();
        assert!(matches!(decode(&bytes), Err(PersistError::Format(_))));
    }

    #[test]
    fn repeated_known_fields_collapse_on_load() {
        let mut snapshot = sample().snapshot();
        let hero = snapshot.entities.first_mut().unwrap();
        let listed = hero.known_fields.clone();
        hero.known_fields.extend(listed.iter().cloned());
        let bytes = encode(snapshot, String::new(), Utc::now()).unwrap();

        let loaded = decode(&bytes).unwrap();

        let restored = loaded.project.list_entities();
        assert_eq!(restored.first().unwrap().known_fields, listed);
        assert_eq!(loaded.repaired_fields, 0);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("absent.json");
        assert!(matches!(load(&file), Err(PersistError::Io { .. })));
    }

    #[test]
    fn loads_first_release_files() {
        let legacy = serde_json::json!({
            "content": "Once upon a time",
            "entities": [{
                "id": "6f1c2a4e-3b8d-4c2e-9a51-0d7e4b1f9c33",
                "name": "Aria",
                "fields": [],
                "color": "#00FF00"
            }],
            "markers": [{
                "id": "0b9d5e7a-1c2f-4e3d-8b6a-5f4e3d2c1b0a",
                "position": 4,
                "entity_id": "6f1c2a4e-3b8d-4c2e-9a51-0d7e4b1f9c33",
                "changes": [{"field_name": "stats.HP", "change_type": "absolute", "value": "42"}],
                "visual": {"icon": "*", "color": "#00FF00"},
                "description": "",
                "created_at": 1_700_000_000,
                "modified_at": 1_700_000_000
            }]
        });
        let loaded = decode(legacy.to_string().as_bytes()).unwrap();
        assert_eq!(loaded.source_format, SourceFormat::Legacy);
        assert_eq!(loaded.document_payload, "Once upon a time");
        // The legacy schema list was empty, so the marker's path is repaired in.
        assert_eq!(loaded.repaired_fields, 1);

        let hero = loaded.project.list_entities().first().map(|e| e.id).unwrap();
        let state = loaded.project.entity_state(hero, 4).unwrap();
        assert_eq!(
            state.value(&path("stats.HP")).and_then(questscribe_types::FieldValue::as_number),
            Some(42.0)
        );
    }
}
