//! Core records of a QuestScribe project: entities and markers.
//!
//! An [`Entity`] is a tracked character or subject. A [`Marker`] is a single
//! state-change event anchored at a character offset in the document and
//! carrying one or more [`FieldChange`]s for exactly one entity. Markers are
//! the only route by which an entity's tracked state changes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::ids::{EntityId, MarkerId};
use crate::value::{FieldPath, FieldValue};

/// Color assigned to entities that were saved without one.
pub const DEFAULT_ENTITY_COLOR: &str = "#FFD700";

/// Icon used for markers created without an explicit visual.
pub const DEFAULT_MARKER_ICON: &str = "\u{2b50}";

fn default_entity_color() -> String {
    String::from(DEFAULT_ENTITY_COLOR)
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// Creation and last-use timestamps for one known field of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FieldMetadata {
    /// When a marker first referenced the field.
    pub created_at: DateTime<Utc>,
    /// When a marker last inserted or edited a change to the field.
    pub last_modified: DateTime<Utc>,
}

impl FieldMetadata {
    /// Metadata for a field first seen at `now`.
    pub const fn first_seen(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            last_modified: now,
        }
    }
}

/// A tracked character or subject whose state evolves through markers.
///
/// `known_fields` is the entity's field schema in first-use order. Every
/// path referenced by one of the entity's markers is present here; a path
/// only leaves the schema through an explicit global field deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Entity {
    /// Immutable unique identifier.
    pub id: EntityId,
    /// Display name, never blank.
    pub name: String,
    /// Hex color used for this entity's markers in the editor.
    #[serde(default = "default_entity_color")]
    pub color: String,
    /// Field paths this entity has used, in insertion order.
    #[serde(default)]
    #[ts(as = "Vec<String>")]
    pub known_fields: Vec<FieldPath>,
    /// Per-field timestamps keyed by path.
    #[serde(default)]
    #[ts(as = "BTreeMap<String, FieldMetadata>")]
    pub field_metadata: BTreeMap<FieldPath, FieldMetadata>,
    /// When the entity was created.
    pub created_at: DateTime<Utc>,
}

impl Entity {
    /// Whether `path` is part of this entity's field schema.
    pub fn knows_field(&self, path: &FieldPath) -> bool {
        self.known_fields.contains(path)
    }

    /// Record that a marker touched `path` at `now`.
    ///
    /// New paths are appended to `known_fields` with fresh metadata; known
    /// paths only get their `last_modified` bumped. Returns `true` when the
    /// path was new.
    pub fn register_field(&mut self, path: &FieldPath, now: DateTime<Utc>) -> bool {
        if self.knows_field(path) {
            self.field_metadata
                .entry(path.clone())
                .and_modify(|meta| meta.last_modified = now)
                .or_insert_with(|| FieldMetadata::first_seen(now));
            false
        } else {
            self.known_fields.push(path.clone());
            self.field_metadata
                .insert(path.clone(), FieldMetadata::first_seen(now));
            true
        }
    }

    /// Drop `path` and every path below it from the field schema.
    ///
    /// Returns how many known fields were removed.
    pub fn forget_field_tree(&mut self, path: &FieldPath) -> usize {
        let before = self.known_fields.len();
        self.known_fields.retain(|known| !path.is_prefix_of(known));
        self.field_metadata.retain(|known, _| !path.is_prefix_of(known));
        before.saturating_sub(self.known_fields.len())
    }
}

// ---------------------------------------------------------------------------
// Field changes
// ---------------------------------------------------------------------------

/// The three mutation semantics a change can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum ChangeType {
    /// Replace the value at the path.
    Absolute,
    /// Add a numeric delta to the current value.
    Relative,
    /// Delete the path from the computed state.
    Remove,
}

/// A change's semantics together with its payload.
///
/// Adjacently tagged so the wire form is
/// `{"change_type": "relative", "value": -5}`; `remove` carries no value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "change_type", content = "value", rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum ChangeKind {
    /// Set the field to this value.
    Absolute(FieldValue),
    /// Add this delta (negative to subtract).
    Relative(f64),
    /// Delete the field.
    Remove,
}

/// One field mutation inside a marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FieldChange {
    /// Hierarchical path of the affected field.
    #[ts(as = "String")]
    pub field_path: FieldPath,
    /// What happens to the field.
    #[serde(flatten)]
    pub kind: ChangeKind,
}

impl FieldChange {
    /// Set `path` to `value`.
    pub fn absolute(path: FieldPath, value: impl Into<FieldValue>) -> Self {
        Self {
            field_path: path,
            kind: ChangeKind::Absolute(value.into()),
        }
    }

    /// Add `delta` to the number at `path`.
    pub const fn relative(path: FieldPath, delta: f64) -> Self {
        Self {
            field_path: path,
            kind: ChangeKind::Relative(delta),
        }
    }

    /// Remove `path` from the computed state.
    pub const fn remove(path: FieldPath) -> Self {
        Self {
            field_path: path,
            kind: ChangeKind::Remove,
        }
    }

    /// The semantics of this change without its payload.
    pub const fn change_type(&self) -> ChangeType {
        match self.kind {
            ChangeKind::Absolute(_) => ChangeType::Absolute,
            ChangeKind::Relative(_) => ChangeType::Relative,
            ChangeKind::Remove => ChangeType::Remove,
        }
    }

    /// The payload as a [`FieldValue`], absent for removals.
    pub fn value(&self) -> Option<FieldValue> {
        match &self.kind {
            ChangeKind::Absolute(value) => Some(value.clone()),
            ChangeKind::Relative(delta) => Some(FieldValue::Number(*delta)),
            ChangeKind::Remove => None,
        }
    }

    /// Reject payloads that would make the fold non-deterministic.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NonFiniteNumber`] for NaN or infinite
    /// numbers.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let finite = match &self.kind {
            ChangeKind::Absolute(value) => value.is_finite(),
            ChangeKind::Relative(delta) => delta.is_finite(),
            ChangeKind::Remove => true,
        };
        if finite {
            Ok(())
        } else {
            Err(ValidationError::NonFiniteNumber {
                path: self.field_path.to_string(),
            })
        }
    }
}

/// Validate a complete change list for a marker.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyChanges`] for an empty list, or the first
/// per-change error.
pub fn validate_changes(changes: &[FieldChange]) -> Result<(), ValidationError> {
    if changes.is_empty() {
        return Err(ValidationError::EmptyChanges);
    }
    changes.iter().try_for_each(FieldChange::validate)
}

// ---------------------------------------------------------------------------
// Marker
// ---------------------------------------------------------------------------

/// How a marker is drawn in the editor margin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MarkerVisual {
    /// Emoji or short glyph.
    pub icon: String,
    /// Hex color.
    pub color: String,
}

impl Default for MarkerVisual {
    fn default() -> Self {
        Self {
            icon: String::from(DEFAULT_MARKER_ICON),
            color: String::from(DEFAULT_ENTITY_COLOR),
        }
    }
}

/// A recorded state-change event anchored to a document position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Marker {
    /// Unique identifier.
    pub id: MarkerId,
    /// The entity whose state this marker changes.
    pub entity_id: EntityId,
    /// Character offset into the document's linear content.
    pub position: u64,
    /// Changes applied in list order when the marker is folded.
    pub changes: Vec<FieldChange>,
    /// Margin icon and color.
    #[serde(default)]
    pub visual: MarkerVisual,
    /// Optional note such as "leveled up after the boss fight".
    #[serde(default)]
    pub description: Option<String>,
    /// When the marker was inserted.
    pub created_at: DateTime<Utc>,
    /// When the marker's content last changed.
    pub modified_at: DateTime<Utc>,
}

impl Marker {
    /// Distinct paths touched by this marker, in first-occurrence order.
    pub fn touched_paths(&self) -> Vec<&FieldPath> {
        let mut paths: Vec<&FieldPath> = Vec::with_capacity(self.changes.len());
        for change in &self.changes {
            if !paths.contains(&&change.field_path) {
                paths.push(&change.field_path);
            }
        }
        paths
    }

    /// Remove every change to `path` or a path below it.
    ///
    /// Returns how many changes were removed. The marker may be left with no
    /// changes, which is valid: it simply contributes nothing to state.
    pub fn strip_field_tree(&mut self, path: &FieldPath) -> usize {
        let before = self.changes.len();
        self.changes
            .retain(|change| !path.is_prefix_of(&change.field_path));
        before.saturating_sub(self.changes.len())
    }
}

/// Normalize an optional description: blank text means "no description".
pub fn normalize_description(description: Option<String>) -> Option<String> {
    description.filter(|text| !text.trim().is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    fn path(text: &str) -> FieldPath {
        FieldPath::parse(text).unwrap()
    }

    fn entity() -> Entity {
        Entity {
            id: EntityId::new(),
            name: String::from("Aria"),
            color: default_entity_color(),
            known_fields: Vec::new(),
            field_metadata: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn change_wire_format_is_flat() {
        let change = FieldChange::relative(path("stats.HP"), -5.0);
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"field_path": "stats.HP", "change_type": "relative", "value": -5.0})
        );

        let remove: FieldChange =
            serde_json::from_str(r#"{"field_path": "stats.HP", "change_type": "remove"}"#).unwrap();
        assert_eq!(remove.change_type(), ChangeType::Remove);
        assert_eq!(remove.value(), None);

        let absolute: FieldChange = serde_json::from_str(
            r#"{"field_path": "inventory.weapon", "change_type": "absolute", "value": "Sword"}"#,
        )
        .unwrap();
        assert_eq!(absolute.value(), Some(FieldValue::from("Sword")));
    }

    #[test]
    fn relative_change_requires_a_number() {
        let bad: Result<FieldChange, _> = serde_json::from_str(
            r#"{"field_path": "stats.HP", "change_type": "relative", "value": "ten"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn validate_rejects_empty_lists_and_non_finite_numbers() {
        assert_eq!(validate_changes(&[]), Err(ValidationError::EmptyChanges));
        let nan = FieldChange::relative(path("stats.HP"), f64::NAN);
        assert!(matches!(
            validate_changes(&[nan]),
            Err(ValidationError::NonFiniteNumber { .. })
        ));
        let ok = FieldChange::absolute(path("stats.HP"), 50.0);
        assert_eq!(validate_changes(&[ok]), Ok(()));
    }

    #[test]
    fn register_field_appends_once_and_bumps_last_modified() {
        let mut e = entity();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(5);
        assert!(e.register_field(&path("stats.HP"), t0));
        assert!(!e.register_field(&path("stats.HP"), t1));
        assert_eq!(e.known_fields, vec![path("stats.HP")]);
        let meta = e.field_metadata.get(&path("stats.HP")).copied().unwrap();
        assert_eq!(meta.created_at, t0);
        assert_eq!(meta.last_modified, t1);
    }

    #[test]
    fn forget_field_tree_removes_descendants() {
        let mut e = entity();
        let now = Utc::now();
        e.register_field(&path("stats.HP"), now);
        e.register_field(&path("stats.MP"), now);
        e.register_field(&path("level"), now);
        assert_eq!(e.forget_field_tree(&path("stats")), 2);
        assert_eq!(e.known_fields, vec![path("level")]);
        assert_eq!(e.field_metadata.len(), 1);
    }

    #[test]
    fn entity_without_color_gets_default() {
        let json = serde_json::json!({
            "id": EntityId::new(),
            "name": "Bram",
            "created_at": Utc::now(),
        });
        let e: Entity = serde_json::from_value(json).unwrap();
        assert_eq!(e.color, DEFAULT_ENTITY_COLOR);
        assert!(e.known_fields.is_empty());
    }

    #[test]
    fn touched_paths_are_distinct_and_ordered() {
        let now = Utc::now();
        let mut marker = Marker {
            id: MarkerId::new(),
            entity_id: EntityId::new(),
            position: 10,
            changes: vec![
                FieldChange::absolute(path("stats.HP"), 50.0),
                FieldChange::absolute(path("level"), 2.0),
                FieldChange::relative(path("stats.HP"), 5.0),
            ],
            visual: MarkerVisual::default(),
            description: None,
            created_at: now,
            modified_at: now,
        };
        let touched: Vec<String> = marker.touched_paths().iter().map(ToString::to_string).collect();
        assert_eq!(touched, ["stats.HP", "level"]);

        assert_eq!(marker.strip_field_tree(&path("stats")), 2);
        assert_eq!(marker.changes.len(), 1);
    }

    #[test]
    fn blank_descriptions_normalize_to_none() {
        assert_eq!(normalize_description(Some(String::from("  "))), None);
        assert_eq!(
            normalize_description(Some(String::from("Boss fight"))),
            Some(String::from("Boss fight"))
        );
    }
}
