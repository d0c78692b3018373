//! Import of project files written by the first desktop release.
//!
//! Those files carry no `format_version`. They store the document text as
//! `content`, an entity's schema as `fields`, every change value as a
//! string under `field_name`, and timestamps as integer Unix seconds.
//! [`upgrade`] converts such a file into the current records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use questscribe_tracker::ProjectSnapshot;
use questscribe_types::{
    ChangeKind, DEFAULT_ENTITY_COLOR, Entity, EntityId, FieldChange, FieldMetadata, FieldPath,
    FieldValue, Marker, MarkerId, MarkerVisual, normalize_description,
};
use serde::Deserialize;

use crate::error::PersistError;

/// A first-release project file.
#[derive(Debug, Deserialize)]
pub struct LegacyDocument {
    content: String,
    #[serde(default)]
    entities: Vec<LegacyEntity>,
    #[serde(default)]
    markers: Vec<LegacyMarker>,
}

#[derive(Debug, Deserialize)]
struct LegacyEntity {
    id: String,
    name: String,
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    field_metadata: BTreeMap<String, LegacyFieldMetadata>,
}

#[derive(Debug, Deserialize)]
struct LegacyFieldMetadata {
    created_at: i64,
    last_modified: i64,
}

#[derive(Debug, Deserialize)]
struct LegacyMarker {
    id: String,
    position: u64,
    entity_id: String,
    changes: Vec<LegacyChange>,
    visual: Option<MarkerVisual>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    modified_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LegacyChange {
    field_name: String,
    change_type: String,
    #[serde(default)]
    value: String,
}

/// Records and document text recovered from a legacy file.
#[derive(Debug)]
pub struct UpgradedDocument {
    /// Entities and markers in file order.
    pub snapshot: ProjectSnapshot,
    /// The former `content` field.
    pub document_payload: String,
}

/// Convert a legacy document into current records.
///
/// Entities have no creation time in the old format; they are stamped with
/// `now` plus one microsecond per position so their file order survives.
///
/// # Errors
///
/// Returns [`PersistError::Format`] for ids that are not UUIDs, blank or
/// malformed field paths, unknown change types, relative values that are not
/// numbers, and out-of-range timestamps.
pub fn upgrade(doc: LegacyDocument, now: DateTime<Utc>) -> Result<UpgradedDocument, PersistError> {
    let mut entities = Vec::with_capacity(doc.entities.len());
    let mut stamp = now;
    for legacy in doc.entities {
        entities.push(upgrade_entity(legacy, stamp)?);
        stamp = stamp
            .checked_add_signed(chrono::Duration::microseconds(1))
            .unwrap_or(stamp);
    }
    let markers = doc
        .markers
        .into_iter()
        .map(|legacy| upgrade_marker(legacy, now))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(UpgradedDocument {
        snapshot: ProjectSnapshot { entities, markers },
        document_payload: doc.content,
    })
}

fn upgrade_entity(legacy: LegacyEntity, created_at: DateTime<Utc>) -> Result<Entity, PersistError> {
    let id = parse_id::<EntityId>(&legacy.id, "entity")?;
    let mut known_fields = Vec::with_capacity(legacy.fields.len());
    for field in &legacy.fields {
        let path = parse_path(field)?;
        if !known_fields.contains(&path) {
            known_fields.push(path);
        }
    }
    let mut field_metadata = BTreeMap::new();
    for (field, meta) in legacy.field_metadata {
        field_metadata.insert(
            parse_path(&field)?,
            FieldMetadata {
                created_at: timestamp(meta.created_at)?,
                last_modified: timestamp(meta.last_modified)?,
            },
        );
    }
    Ok(Entity {
        id,
        name: legacy.name,
        color: legacy
            .color
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| String::from(DEFAULT_ENTITY_COLOR)),
        known_fields,
        field_metadata,
        created_at,
    })
}

fn upgrade_marker(legacy: LegacyMarker, now: DateTime<Utc>) -> Result<Marker, PersistError> {
    let created_at = legacy.created_at.map_or(Ok(now), timestamp)?;
    let modified_at = legacy.modified_at.map_or(Ok(created_at), timestamp)?;
    let changes = legacy
        .changes
        .into_iter()
        .map(upgrade_change)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Marker {
        id: parse_id::<MarkerId>(&legacy.id, "marker")?,
        entity_id: parse_id::<EntityId>(&legacy.entity_id, "entity")?,
        position: legacy.position,
        changes,
        visual: legacy.visual.unwrap_or_default(),
        description: normalize_description(Some(legacy.description)),
        created_at,
        modified_at,
    })
}

fn upgrade_change(legacy: LegacyChange) -> Result<FieldChange, PersistError> {
    let field_path = parse_path(&legacy.field_name)?;
    let kind = match legacy.change_type.as_str() {
        "absolute" => ChangeKind::Absolute(parse_absolute(&legacy.value)),
        "relative" => {
            let delta = legacy
                .value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|d| d.is_finite())
                .ok_or_else(|| {
                    PersistError::Format(format!(
                        "relative change to {field_path} has non-numeric value {:?}",
                        legacy.value
                    ))
                })?;
            ChangeKind::Relative(delta)
        }
        "remove" => ChangeKind::Remove,
        other => {
            return Err(PersistError::Format(format!("unknown change type {other:?}")));
        }
    };
    Ok(FieldChange { field_path, kind })
}

/// Interpret a stringly-typed absolute value: number, then boolean, else text.
fn parse_absolute(raw: &str) -> FieldValue {
    let trimmed = raw.trim();
    if let Some(n) = trimmed.parse::<f64>().ok().filter(|n| n.is_finite()) {
        return FieldValue::Number(n);
    }
    match trimmed {
        "true" => FieldValue::Boolean(true),
        "false" => FieldValue::Boolean(false),
        _ => FieldValue::Text(raw.to_owned()),
    }
}

fn parse_id<T>(raw: &str, what: &str) -> Result<T, PersistError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| PersistError::Format(format!("{what} id {raw:?}: {e}")))
}

fn parse_path(raw: &str) -> Result<FieldPath, PersistError> {
    FieldPath::parse(raw).map_err(|e| PersistError::Format(format!("field path {raw:?}: {e}")))
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, PersistError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| PersistError::Format(format!("timestamp {secs} is out of range")))
}
