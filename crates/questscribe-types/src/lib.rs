//! Shared type definitions for the QuestScribe state tracker.
//!
//! This crate is the single source of truth for the records exchanged
//! between the tracking engine, the project file, and the editing surface.
//! Types flow downstream to `TypeScript` via `ts-rs` for the editor.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for entity and marker identifiers
//! - [`value`] -- Field values, hierarchical field paths, and the state tree
//! - [`structs`] -- Entities, markers, and field changes
//! - [`error`] -- Validation errors raised at the command boundary

pub mod error;
pub mod ids;
pub mod structs;
pub mod value;

// Re-export all public types at crate root for convenience.
pub use error::ValidationError;
pub use ids::{EntityId, MarkerId};
pub use structs::{
    ChangeKind, ChangeType, DEFAULT_ENTITY_COLOR, DEFAULT_MARKER_ICON, Entity, FieldChange,
    FieldMetadata, Marker, MarkerVisual, normalize_description, validate_changes,
};
pub use value::{FieldPath, FieldValue, PATH_SEPARATOR, StateNode, StateTree};
