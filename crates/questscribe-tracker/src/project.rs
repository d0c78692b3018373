//! The project aggregate: both stores plus a revision counter.
//!
//! [`Project`] is the unit the command surface locks. Each command method
//! maps to one user-visible operation, runs to completion against both
//! stores, and bumps the revision only when something actually changed.

use questscribe_types::{Entity, EntityId, FieldPath, Marker, MarkerId, StateTree};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::entity_store::{DeletedEntity, DeletedField, EntityStore};
use crate::error::TrackerError;
use crate::marker_store::{MarkerStore, MarkerUpdate, NewMarker, RepositionOutcome, RepositionUpdate};
use crate::state::{ComputedState, StateComputer};

/// Owned copy of a project's records, ready to be written out.
///
/// Markers are kept in insertion order so a restore reproduces the same
/// same-position tie-breaks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    /// Entities, oldest first.
    pub entities: Vec<Entity>,
    /// Markers in insertion order.
    pub markers: Vec<Marker>,
}

/// A project rebuilt from saved records.
#[derive(Debug, Clone)]
pub struct RestoredProject {
    /// The rebuilt project.
    pub project: Project,
    /// How many missing `known_fields` entries were re-registered.
    pub repaired_fields: usize,
}

/// Entities, markers, and the mutation counter.
#[derive(Debug, Clone, Default)]
pub struct Project {
    entities: EntityStore,
    markers: MarkerStore,
    revision: u64,
}

impl Project {
    /// An empty project at revision zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read access to the entity store.
    pub const fn entities(&self) -> &EntityStore {
        &self.entities
    }

    /// Read access to the marker store.
    pub const fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    /// Number of successful mutations since the project was created.
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    fn bump(&mut self) {
        self.revision = self.revision.saturating_add(1);
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    /// Create an entity.
    pub fn create_entity(&mut self, name: &str, color: &str) -> Result<Entity, TrackerError> {
        let entity = self.entities.create(name, color)?;
        self.bump();
        Ok(entity)
    }

    /// Rename or recolor an entity.
    pub fn update_entity(
        &mut self,
        id: EntityId,
        name: &str,
        color: &str,
    ) -> Result<Entity, TrackerError> {
        let entity = self.entities.rename_or_recolor(id, name, color)?;
        self.bump();
        Ok(entity)
    }

    /// Delete an entity together with all of its markers.
    pub fn delete_entity(&mut self, id: EntityId) -> Result<DeletedEntity, TrackerError> {
        let deleted = self.entities.delete(id, &mut self.markers)?;
        self.bump();
        Ok(deleted)
    }

    /// Copy an entity's schema under a new name.
    pub fn duplicate_entity(&mut self, id: EntityId, new_name: &str) -> Result<Entity, TrackerError> {
        let entity = self.entities.duplicate(id, new_name)?;
        self.bump();
        Ok(entity)
    }

    /// All entities, oldest first.
    pub fn list_entities(&self) -> Vec<Entity> {
        self.entities.all()
    }

    /// Erase a field (and its descendants) from an entity and its markers.
    pub fn delete_field(
        &mut self,
        entity_id: EntityId,
        path: &FieldPath,
    ) -> Result<DeletedField, TrackerError> {
        let deleted = self
            .entities
            .delete_field_globally(entity_id, path, &mut self.markers)?;
        self.bump();
        Ok(deleted)
    }

    // -----------------------------------------------------------------------
    // Markers
    // -----------------------------------------------------------------------

    /// Insert a marker.
    pub fn insert_marker(&mut self, new: NewMarker) -> Result<Marker, TrackerError> {
        let marker = self.markers.insert(&mut self.entities, new)?;
        self.bump();
        Ok(marker)
    }

    /// Apply a partial update to a marker.
    pub fn update_marker(
        &mut self,
        id: MarkerId,
        update: MarkerUpdate,
    ) -> Result<Marker, TrackerError> {
        let marker = self.markers.update(&mut self.entities, id, update)?;
        self.bump();
        Ok(marker)
    }

    /// Delete one marker.
    pub fn delete_marker(&mut self, id: MarkerId) -> Result<Marker, TrackerError> {
        let marker = self.markers.delete(id)?;
        self.bump();
        Ok(marker)
    }

    /// Move markers in one batch; unknown ids are skipped.
    pub fn reposition_markers(&mut self, updates: &[RepositionUpdate]) -> RepositionOutcome {
        let outcome = self.markers.reposition_many(updates);
        if outcome.applied > 0 {
            self.bump();
        }
        outcome
    }

    /// Markers in document order, optionally for a single entity.
    pub fn list_markers(&self, entity_id: Option<EntityId>) -> Vec<Marker> {
        entity_id.map_or_else(|| self.markers.all(), |id| self.markers.for_entity(id))
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    /// Computed state of an entity at a document position.
    ///
    /// Coercions of non-numeric values are logged at `warn`.
    pub fn entity_state(&self, entity_id: EntityId, position: u64) -> Result<StateTree, TrackerError> {
        let computed = self.entity_state_detailed(entity_id, position)?;
        for coercion in &computed.coercions {
            warn!(
                entity_id = %entity_id,
                marker_id = %coercion.marker_id,
                path = %coercion.field_path,
                found = coercion.found,
                "relative change applied to non-numeric value, treated as 0"
            );
        }
        for saturation in &computed.saturations {
            warn!(
                entity_id = %entity_id,
                marker_id = %saturation.marker_id,
                path = %saturation.field_path,
                clamped_to = saturation.clamped_to,
                "relative change overflowed, value clamped"
            );
        }
        Ok(computed.tree)
    }

    /// Computed state plus coercion and saturation diagnostics.
    pub fn entity_state_detailed(
        &self,
        entity_id: EntityId,
        position: u64,
    ) -> Result<ComputedState, TrackerError> {
        StateComputer::new(&self.entities, &self.markers).compute_detailed(entity_id, position)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Copy out every record for saving.
    pub fn snapshot(&self) -> ProjectSnapshot {
        ProjectSnapshot {
            entities: self.entities.all(),
            markers: self.markers.in_insertion_order(),
        }
    }

    /// Empty both stores for a new document.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.markers.clear();
        self.bump();
        info!(revision = self.revision, "project cleared");
    }

    /// Rebuild a project from saved records.
    ///
    /// Every record is checked against the store invariants. Marker paths
    /// missing from their entity's schema are re-registered and counted.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::DuplicateEntity`],
    /// [`TrackerError::DuplicateMarker`], [`TrackerError::DanglingMarker`],
    /// or a validation error for a blank name or non-finite number.
    pub fn from_snapshot(snapshot: ProjectSnapshot) -> Result<RestoredProject, TrackerError> {
        let mut entities = EntityStore::new();
        for entity in snapshot.entities {
            entities.restore(entity)?;
        }

        let mut markers = MarkerStore::new();
        let mut repaired_fields = 0_usize;
        for marker in snapshot.markers {
            for path in marker.touched_paths() {
                let known = entities
                    .get(marker.entity_id)
                    .is_some_and(|entity| entity.knows_field(path));
                if !known && entities.contains(marker.entity_id) {
                    warn!(
                        entity_id = %marker.entity_id,
                        marker_id = %marker.id,
                        path = %path,
                        "re-registering field missing from entity schema"
                    );
                    entities.register_field_use(marker.entity_id, path, marker.modified_at)?;
                    repaired_fields = repaired_fields.saturating_add(1);
                }
            }
            markers.restore(&entities, marker)?;
        }

        info!(
            entities = entities.len(),
            markers = markers.len(),
            repaired_fields,
            "project restored"
        );
        Ok(RestoredProject {
            project: Self {
                entities,
                markers,
                revision: 0,
            },
            repaired_fields,
        })
    }
}
