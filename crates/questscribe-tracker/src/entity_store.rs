//! The entity store: every tracked character and its field schema.
//!
//! [`EntityStore`] owns the [`Entity`] records keyed by [`EntityId`].
//! Operations whose effect reaches into markers (delete, global field
//! deletion) take the [`MarkerStore`] as an explicit `&mut` parameter so
//! both stores change inside a single call and no caller can observe one
//! half of the mutation.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use questscribe_types::{DEFAULT_ENTITY_COLOR, Entity, EntityId, FieldPath, ValidationError};
use tracing::{debug, warn};

use crate::error::TrackerError;
use crate::marker_store::MarkerStore;

/// All entities of a project.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    /// Entities indexed by identifier.
    entities: BTreeMap<EntityId, Entity>,
}

/// Outcome of deleting an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedEntity {
    /// The removed entity record.
    pub entity: Entity,
    /// How many of its markers were removed with it.
    pub removed_markers: usize,
}

/// Outcome of deleting a field path from an entity everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeletedField {
    /// Known-field entries dropped (the path plus any descendants).
    pub removed_known_fields: usize,
    /// Field changes stripped from the entity's markers.
    pub removed_changes: usize,
}

impl EntityStore {
    /// Create an empty store.
    pub const fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
        }
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the store holds no entities.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Whether an entity with this id exists.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Look up an entity.
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Look up an entity, failing with [`TrackerError::EntityNotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::EntityNotFound`] for an unknown id.
    pub fn require(&self, id: EntityId) -> Result<&Entity, TrackerError> {
        self.entities.get(&id).ok_or(TrackerError::EntityNotFound(id))
    }

    /// Every entity, oldest first (ties broken by id).
    pub fn all(&self) -> Vec<Entity> {
        let mut all: Vec<Entity> = self.entities.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }

    /// Create a new entity with an empty field schema.
    ///
    /// The name is trimmed; a blank color falls back to the default gold.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] if the trimmed name is empty.
    pub fn create(&mut self, name: &str, color: &str) -> Result<Entity, TrackerError> {
        let name = clean_name(name)?;
        let entity = Entity {
            id: EntityId::new(),
            name,
            color: clean_color(color),
            known_fields: Vec::new(),
            field_metadata: BTreeMap::new(),
            created_at: Utc::now(),
        };
        self.entities.insert(entity.id, entity.clone());
        debug!(entity_id = %entity.id, name = %entity.name, "entity created");
        Ok(entity)
    }

    /// Change an entity's name and color. Markers are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::EntityNotFound`] for an unknown id or
    /// [`ValidationError::EmptyName`] for a blank name.
    pub fn rename_or_recolor(
        &mut self,
        id: EntityId,
        name: &str,
        color: &str,
    ) -> Result<Entity, TrackerError> {
        let name = clean_name(name)?;
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(TrackerError::EntityNotFound(id))?;
        entity.name = name;
        entity.color = clean_color(color);
        debug!(entity_id = %id, name = %entity.name, "entity updated");
        Ok(entity.clone())
    }

    /// Create a template copy of an entity: same color and field schema,
    /// fresh id, the given name, and no markers.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::EntityNotFound`] for an unknown source or
    /// [`ValidationError::EmptyName`] for a blank name.
    pub fn duplicate(&mut self, id: EntityId, new_name: &str) -> Result<Entity, TrackerError> {
        let name = clean_name(new_name)?;
        let source = self.require(id)?;
        let copy = Entity {
            id: EntityId::new(),
            name,
            color: source.color.clone(),
            known_fields: source.known_fields.clone(),
            field_metadata: source.field_metadata.clone(),
            created_at: Utc::now(),
        };
        self.entities.insert(copy.id, copy.clone());
        debug!(source = %id, entity_id = %copy.id, "entity duplicated");
        Ok(copy)
    }

    /// Delete an entity and, in the same call, every marker it owns.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::EntityNotFound`] for an unknown id; nothing
    /// is removed in that case.
    pub fn delete(
        &mut self,
        id: EntityId,
        markers: &mut MarkerStore,
    ) -> Result<DeletedEntity, TrackerError> {
        let entity = self
            .entities
            .remove(&id)
            .ok_or(TrackerError::EntityNotFound(id))?;
        let removed_markers = markers.remove_for_entity(id);
        debug!(entity_id = %id, removed_markers, "entity deleted");
        Ok(DeletedEntity {
            entity,
            removed_markers,
        })
    }

    /// Record that a marker touched `path` for this entity.
    ///
    /// Idempotent: a new path is appended with fresh metadata, a known
    /// path has its `last_modified` bumped. Returns `true` for new paths.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::EntityNotFound`] for an unknown id.
    pub fn register_field_use(
        &mut self,
        id: EntityId,
        path: &FieldPath,
        now: DateTime<Utc>,
    ) -> Result<bool, TrackerError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(TrackerError::EntityNotFound(id))?;
        Ok(entity.register_field(path, now))
    }

    /// Erase `path` (and every path below it) from an entity everywhere:
    /// its field schema and every change in every one of its markers.
    ///
    /// Markers left with no changes are kept.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::EntityNotFound`] for an unknown id.
    pub fn delete_field_globally(
        &mut self,
        id: EntityId,
        path: &FieldPath,
        markers: &mut MarkerStore,
    ) -> Result<DeletedField, TrackerError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(TrackerError::EntityNotFound(id))?;
        let removed_known_fields = entity.forget_field_tree(path);
        let removed_changes = markers.strip_field(id, path);
        debug!(
            entity_id = %id,
            path = %path,
            removed_known_fields,
            removed_changes,
            "field deleted globally"
        );
        Ok(DeletedField {
            removed_known_fields,
            removed_changes,
        })
    }

    /// Insert a previously saved entity. Repeated `known_fields` entries
    /// collapse to their first occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::DuplicateEntity`] if the id is taken, or
    /// [`ValidationError::EmptyName`] if the saved name is blank.
    pub fn restore(&mut self, mut entity: Entity) -> Result<(), TrackerError> {
        if entity.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.entities.contains_key(&entity.id) {
            return Err(TrackerError::DuplicateEntity(entity.id));
        }
        let listed = entity.known_fields.len();
        let mut seen = BTreeSet::new();
        entity.known_fields.retain(|path| seen.insert(path.clone()));
        if entity.known_fields.len() < listed {
            warn!(
                entity_id = %entity.id,
                dropped = listed.saturating_sub(entity.known_fields.len()),
                "dropped repeated known_fields entries"
            );
        }
        self.entities.insert(entity.id, entity);
        Ok(())
    }

    /// Remove every entity.
    pub fn clear(&mut self) {
        self.entities.clear();
    }
}

fn clean_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(ValidationError::EmptyName)
    } else {
        Ok(trimmed.to_owned())
    }
}

fn clean_color(color: &str) -> String {
    let trimmed = color.trim();
    if trimmed.is_empty() {
        String::from(DEFAULT_ENTITY_COLOR)
    } else {
        trimmed.to_owned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use questscribe_types::{FieldChange, MarkerVisual};

    use super::*;
    use crate::marker_store::NewMarker;

    fn path(text: &str) -> FieldPath {
        FieldPath::parse(text).unwrap()
    }

    #[test]
    fn create_trims_name_and_defaults_color() {
        let mut store = EntityStore::new();
        let hero = store.create("  Aria  ", "").unwrap();
        assert_eq!(hero.name, "Aria");
        assert_eq!(hero.color, DEFAULT_ENTITY_COLOR);
        assert!(hero.known_fields.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn create_rejects_blank_name() {
        let mut store = EntityStore::new();
        assert_eq!(
            store.create("   ", "#fff"),
            Err(TrackerError::Validation(ValidationError::EmptyName))
        );
        assert!(store.is_empty());
    }

    #[test]
    fn rename_unknown_or_blank_fails_without_change() {
        let mut store = EntityStore::new();
        let hero = store.create("Aria", "#f00").unwrap();
        let ghost = EntityId::new();
        assert_eq!(
            store.rename_or_recolor(ghost, "X", "#000"),
            Err(TrackerError::EntityNotFound(ghost))
        );
        assert!(store.rename_or_recolor(hero.id, " ", "#000").is_err());
        assert_eq!(store.get(hero.id).map(|e| e.name.as_str()), Some("Aria"));

        let renamed = store.rename_or_recolor(hero.id, "Aria the Bold", "#0f0").unwrap();
        assert_eq!(renamed.name, "Aria the Bold");
        assert_eq!(renamed.color, "#0f0");
    }

    #[test]
    fn duplicate_copies_schema_but_not_identity() {
        let mut store = EntityStore::new();
        let hero = store.create("Aria", "#f00").unwrap();
        store
            .register_field_use(hero.id, &path("stats.HP"), Utc::now())
            .unwrap();

        let copy = store.duplicate(hero.id, "Aria (template)").unwrap();
        assert_ne!(copy.id, hero.id);
        assert_eq!(copy.color, "#f00");
        assert_eq!(copy.known_fields, vec![path("stats.HP")]);

        // Mutating the copy leaves the source untouched.
        store
            .register_field_use(copy.id, &path("stats.MP"), Utc::now())
            .unwrap();
        assert_eq!(store.get(hero.id).map(|e| e.known_fields.len()), Some(1));
        assert_eq!(store.get(copy.id).map(|e| e.known_fields.len()), Some(2));
    }

    #[test]
    fn delete_cascades_to_markers() {
        let mut entities = EntityStore::new();
        let mut markers = MarkerStore::new();
        let hero = entities.create("Aria", "#f00").unwrap();
        let villain = entities.create("Mordred", "#000").unwrap();
        for (owner, position) in [(hero.id, 5), (hero.id, 9), (villain.id, 7)] {
            markers
                .insert(
                    &mut entities,
                    NewMarker {
                        entity_id: owner,
                        position,
                        changes: vec![FieldChange::absolute(path("stats.HP"), 10.0)],
                        visual: MarkerVisual::default(),
                        description: None,
                    },
                )
                .unwrap();
        }

        let deleted = entities.delete(hero.id, &mut markers).unwrap();
        assert_eq!(deleted.removed_markers, 2);
        assert!(!entities.contains(hero.id));
        assert!(markers.all().iter().all(|m| m.entity_id == villain.id));
        assert_eq!(markers.len(), 1);

        assert_eq!(
            entities.delete(hero.id, &mut markers),
            Err(TrackerError::EntityNotFound(hero.id))
        );
    }

    #[test]
    fn restore_keeps_first_of_repeated_known_fields() {
        let mut source = EntityStore::new();
        let mut hero = source.create("Aria", "#f00").unwrap();
        let hp = FieldPath::parse("stats.HP").unwrap();
        let gold = FieldPath::parse("gold").unwrap();
        hero.known_fields = vec![hp.clone(), gold.clone(), hp.clone(), gold.clone()];

        let mut store = EntityStore::new();
        store.restore(hero.clone()).unwrap();

        assert_eq!(store.get(hero.id).unwrap().known_fields, vec![hp, gold]);
    }

    #[test]
    fn restore_rejects_duplicates() {
        let mut store = EntityStore::new();
        let hero = store.create("Aria", "#f00").unwrap();
        assert_eq!(
            store.restore(hero.clone()),
            Err(TrackerError::DuplicateEntity(hero.id))
        );
    }
}
