//! The marker store: every state-change event anchored in the document.
//!
//! Markers live in a hash map keyed by [`MarkerId`] so batch repositioning
//! costs one lookup per update. Document order is derived on demand from
//! `(position, created_at, seq)`, where `seq` is a monotonic insertion
//! counter owned by the store. The counter makes same-position markers fold
//! in a reproducible order even when their timestamps collide.

use std::collections::HashMap;

use chrono::Utc;
use questscribe_types::{
    EntityId, FieldChange, FieldPath, Marker, MarkerId, MarkerVisual, normalize_description,
    validate_changes,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity_store::EntityStore;
use crate::error::TrackerError;

/// Parameters for inserting a marker.
#[derive(Debug, Clone)]
pub struct NewMarker {
    /// Entity whose state the marker changes.
    pub entity_id: EntityId,
    /// Character offset in the document.
    pub position: u64,
    /// Non-empty list of changes.
    pub changes: Vec<FieldChange>,
    /// Margin icon and color.
    pub visual: MarkerVisual,
    /// Optional note; blank text is stored as absent.
    pub description: Option<String>,
}

/// Partial update of a marker. `None` fields are left unchanged.
///
/// The position is deliberately absent: markers only move through
/// [`MarkerStore::reposition_many`].
#[derive(Debug, Clone, Default)]
pub struct MarkerUpdate {
    /// Reassign the marker to another entity.
    pub entity_id: Option<EntityId>,
    /// Replace the whole change list.
    pub changes: Option<Vec<FieldChange>>,
    /// Replace the visual.
    pub visual: Option<MarkerVisual>,
    /// Replace the description; blank text clears it.
    pub description: Option<String>,
}

/// One entry of a reposition batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositionUpdate {
    /// Marker to move.
    pub marker_id: MarkerId,
    /// New character offset.
    pub position: u64,
}

/// Result of a reposition batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepositionOutcome {
    /// Updates applied to existing markers.
    pub applied: usize,
    /// Updates naming unknown markers, ignored.
    pub skipped: usize,
}

#[derive(Debug, Clone)]
struct StoredMarker {
    marker: Marker,
    seq: u64,
}

impl StoredMarker {
    fn order_key(&self) -> (u64, chrono::DateTime<Utc>, u64) {
        (self.marker.position, self.marker.created_at, self.seq)
    }
}

/// All markers of a project.
#[derive(Debug, Clone, Default)]
pub struct MarkerStore {
    markers: HashMap<MarkerId, StoredMarker>,
    next_seq: u64,
}

impl MarkerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of markers.
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Whether the store holds no markers.
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Look up a marker.
    pub fn get(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.get(&id).map(|stored| &stored.marker)
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        seq
    }

    /// Insert a new marker and register its paths with the entity.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::EntityNotFound`] for an unknown entity or a
    /// validation error for an empty or non-finite change list. Nothing is
    /// modified on error.
    pub fn insert(
        &mut self,
        entities: &mut EntityStore,
        new: NewMarker,
    ) -> Result<Marker, TrackerError> {
        entities.require(new.entity_id)?;
        validate_changes(&new.changes)?;

        let now = Utc::now();
        let marker = Marker {
            id: MarkerId::new(),
            entity_id: new.entity_id,
            position: new.position,
            changes: new.changes,
            visual: new.visual,
            description: normalize_description(new.description),
            created_at: now,
            modified_at: now,
        };
        for path in marker.touched_paths() {
            entities.register_field_use(marker.entity_id, path, now)?;
        }

        let seq = self.take_seq();
        self.markers.insert(
            marker.id,
            StoredMarker {
                marker: marker.clone(),
                seq,
            },
        );
        debug!(
            marker_id = %marker.id,
            entity_id = %marker.entity_id,
            position = marker.position,
            changes = marker.changes.len(),
            "marker inserted"
        );
        Ok(marker)
    }

    /// Apply a partial update to a marker.
    ///
    /// When the entity or the change list changes, every path of the
    /// resulting change list is registered with the resulting entity. The
    /// previous entity keeps its registrations.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::MarkerNotFound`],
    /// [`TrackerError::EntityNotFound`] for an unknown target entity, or a
    /// validation error for a bad change list. Nothing is modified on error.
    pub fn update(
        &mut self,
        entities: &mut EntityStore,
        id: MarkerId,
        update: MarkerUpdate,
    ) -> Result<Marker, TrackerError> {
        let stored = self
            .markers
            .get_mut(&id)
            .ok_or(TrackerError::MarkerNotFound(id))?;
        if let Some(entity_id) = update.entity_id {
            entities.require(entity_id)?;
        }
        if let Some(changes) = &update.changes {
            validate_changes(changes)?;
        }

        let now = Utc::now();
        let marker = &mut stored.marker;
        let reregister = update.entity_id.is_some() || update.changes.is_some();
        if let Some(entity_id) = update.entity_id {
            marker.entity_id = entity_id;
        }
        if let Some(changes) = update.changes {
            marker.changes = changes;
        }
        if let Some(visual) = update.visual {
            marker.visual = visual;
        }
        if let Some(description) = update.description {
            marker.description = normalize_description(Some(description));
        }
        marker.modified_at = now;

        if reregister {
            for path in marker.touched_paths() {
                entities.register_field_use(marker.entity_id, path, now)?;
            }
        }
        debug!(marker_id = %id, entity_id = %marker.entity_id, "marker updated");
        Ok(marker.clone())
    }

    /// Remove a single marker.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::MarkerNotFound`] for an unknown id.
    pub fn delete(&mut self, id: MarkerId) -> Result<Marker, TrackerError> {
        let stored = self
            .markers
            .remove(&id)
            .ok_or(TrackerError::MarkerNotFound(id))?;
        debug!(marker_id = %id, "marker deleted");
        Ok(stored.marker)
    }

    /// Move markers after the document was edited.
    ///
    /// Best effort: unknown ids are skipped and counted, never an error.
    /// Each update is a single hash lookup.
    pub fn reposition_many(&mut self, updates: &[RepositionUpdate]) -> RepositionOutcome {
        let mut outcome = RepositionOutcome::default();
        for update in updates {
            if let Some(stored) = self.markers.get_mut(&update.marker_id) {
                stored.marker.position = update.position;
                outcome.applied = outcome.applied.saturating_add(1);
            } else {
                outcome.skipped = outcome.skipped.saturating_add(1);
            }
        }
        debug!(
            applied = outcome.applied,
            skipped = outcome.skipped,
            "markers repositioned"
        );
        outcome
    }

    /// Remove every change to `path` or below it from one entity's markers.
    ///
    /// Returns the number of changes removed.
    pub fn strip_field(&mut self, entity_id: EntityId, path: &FieldPath) -> usize {
        self.markers
            .values_mut()
            .filter(|stored| stored.marker.entity_id == entity_id)
            .map(|stored| stored.marker.strip_field_tree(path))
            .fold(0_usize, usize::saturating_add)
    }

    /// Remove every marker of an entity. Returns how many were removed.
    pub fn remove_for_entity(&mut self, entity_id: EntityId) -> usize {
        let before = self.markers.len();
        self.markers
            .retain(|_, stored| stored.marker.entity_id != entity_id);
        before.saturating_sub(self.markers.len())
    }

    /// Markers of `entity_id` at or before `position`, in fold order.
    pub fn for_entity_up_to(&self, entity_id: EntityId, position: u64) -> Vec<&Marker> {
        let mut selected: Vec<&StoredMarker> = self
            .markers
            .values()
            .filter(|stored| {
                stored.marker.entity_id == entity_id && stored.marker.position <= position
            })
            .collect();
        selected.sort_by_key(|stored| stored.order_key());
        selected.into_iter().map(|stored| &stored.marker).collect()
    }

    /// Every marker in document order.
    pub fn all(&self) -> Vec<Marker> {
        self.sorted_by(StoredMarker::order_key)
    }

    /// Markers of one entity in document order.
    pub fn for_entity(&self, entity_id: EntityId) -> Vec<Marker> {
        let mut all = self.all();
        all.retain(|marker| marker.entity_id == entity_id);
        all
    }

    /// Every marker in insertion order.
    ///
    /// Saving in this order lets [`MarkerStore::restore`] rebuild the same
    /// sequence numbers, so same-position ties fold identically after a
    /// reload.
    pub fn in_insertion_order(&self) -> Vec<Marker> {
        self.sorted_by(|stored| stored.seq)
    }

    fn sorted_by<K: Ord>(&self, key: impl Fn(&StoredMarker) -> K) -> Vec<Marker> {
        let mut stored: Vec<&StoredMarker> = self.markers.values().collect();
        stored.sort_by_key(|s| key(*s));
        stored.into_iter().map(|s| s.marker.clone()).collect()
    }

    /// Insert a previously saved marker verbatim, assigning the next
    /// sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::DuplicateMarker`] for a taken id,
    /// [`TrackerError::DanglingMarker`] when the owning entity is unknown,
    /// or a validation error for a non-finite number.
    pub fn restore(&mut self, entities: &EntityStore, marker: Marker) -> Result<(), TrackerError> {
        if self.markers.contains_key(&marker.id) {
            return Err(TrackerError::DuplicateMarker(marker.id));
        }
        if !entities.contains(marker.entity_id) {
            return Err(TrackerError::DanglingMarker {
                marker: marker.id,
                entity: marker.entity_id,
            });
        }
        marker.changes.iter().try_for_each(FieldChange::validate)?;
        let seq = self.take_seq();
        self.markers.insert(marker.id, StoredMarker { marker, seq });
        Ok(())
    }

    /// Remove every marker and reset the sequence counter.
    pub fn clear(&mut self) {
        self.markers.clear();
        self.next_seq = 0;
    }
}
