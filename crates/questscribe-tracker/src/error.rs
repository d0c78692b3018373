//! Error types for the `questscribe-tracker` crate.
//!
//! All fallible store operations return [`TrackerError`]. Every operation
//! validates before it mutates, so an error always means nothing changed.

use questscribe_types::{EntityId, MarkerId, ValidationError};

/// Errors that can occur while mutating or querying the stores.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    /// No entity with this identifier exists.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// No marker with this identifier exists.
    #[error("marker not found: {0}")]
    MarkerNotFound(MarkerId),

    /// The command carried malformed input.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Two entities with the same identifier were restored.
    #[error("duplicate entity id: {0}")]
    DuplicateEntity(EntityId),

    /// Two markers with the same identifier were restored.
    #[error("duplicate marker id: {0}")]
    DuplicateMarker(MarkerId),

    /// A restored marker points at an entity that does not exist.
    #[error("marker {marker} references unknown entity {entity}")]
    DanglingMarker {
        /// The orphaned marker.
        marker: MarkerId,
        /// The missing entity.
        entity: EntityId,
    },
}

impl TrackerError {
    /// Whether this error means an identifier did not resolve.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::EntityNotFound(_) | Self::MarkerNotFound(_))
    }
}
