//! Field values, hierarchical field paths, and the computed state tree.
//!
//! A [`FieldPath`] is parsed once from its dotted text form (`stats.HP`)
//! and carried as a segment list from then on. Tree operations on
//! [`StateTree`] walk segments directly and never re-split strings.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;

/// Separator between path segments in the textual form.
pub const PATH_SEPARATOR: char = '.';

// ---------------------------------------------------------------------------
// FieldPath
// ---------------------------------------------------------------------------

/// Ordered, non-empty sequence of non-empty path segments.
///
/// Serialized as its dotted string so it can key JSON objects. Ordering is
/// lexicographic by segment, which keeps metadata maps stable on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Parse a dotted path such as `stats.HP`.
    ///
    /// Segments are trimmed. The whole path must contain at least one
    /// segment and no segment may be empty.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyPath`] for blank input and
    /// [`ValidationError::EmptySegment`] when any segment is empty.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyPath);
        }
        let segments: Vec<String> = trimmed
            .split(PATH_SEPARATOR)
            .map(|segment| segment.trim().to_owned())
            .collect();
        if segments.iter().any(String::is_empty) {
            return Err(ValidationError::EmptySegment {
                path: trimmed.to_owned(),
            });
        }
        Ok(Self(segments))
    }

    /// Build a path from already-split segments.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyPath`] when `segments` is empty, or
    /// [`ValidationError::EmptySegment`] when a segment is blank or itself
    /// contains the separator.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments
            .into_iter()
            .map(|s| s.into().trim().to_owned())
            .collect();
        if segments.is_empty() {
            return Err(ValidationError::EmptyPath);
        }
        if segments
            .iter()
            .any(|s| s.is_empty() || s.contains(PATH_SEPARATOR))
        {
            return Err(ValidationError::EmptySegment {
                path: segments.join("."),
            });
        }
        Ok(Self(segments))
    }

    /// The path segments, root first.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Number of segments (always at least one).
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Whether `self` equals `other` or is one of its ancestors.
    ///
    /// `stats` is a prefix of `stats.HP` and of itself, but not of
    /// `statsX.HP`.
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl TryFrom<String> for FieldPath {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

impl core::str::FromStr for FieldPath {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

/// A tracked attribute value.
///
/// Serialized untagged, so the wire form is a plain JSON number, string, or
/// boolean. Arithmetic is only defined for [`FieldValue::Number`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(untagged)]
#[ts(export, export_to = "bindings/")]
pub enum FieldValue {
    /// A numeric value such as hit points or gold.
    Number(f64),
    /// Free text such as a title or a location name.
    Text(String),
    /// A flag such as `poisoned`.
    Boolean(bool),
}

impl FieldValue {
    /// The numeric payload, if this is a number.
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) | Self::Boolean(_) => None,
        }
    }

    /// Short name of the variant, used in diagnostics.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::Boolean(_) => "boolean",
        }
    }

    /// Whether the value can be stored and folded deterministically.
    ///
    /// NaN and infinities are rejected so two computed trees can always be
    /// compared structurally.
    pub const fn is_finite(&self) -> bool {
        match self {
            Self::Number(n) => n.is_finite(),
            Self::Text(_) | Self::Boolean(_) => true,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

// ---------------------------------------------------------------------------
// StateTree
// ---------------------------------------------------------------------------

/// One node of a computed state tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(untagged)]
#[ts(export, export_to = "bindings/")]
pub enum StateNode {
    /// A leaf value.
    Value(FieldValue),
    /// A nested category such as `stats` or `inventory`.
    Category(StateTree),
}

/// Point-in-time state of an entity: segment -> value or nested category.
///
/// Built fresh for each query and never persisted. Serializes as nested
/// JSON objects, e.g. `{"stats": {"HP": 60}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct StateTree(BTreeMap<String, StateNode>);

impl StateTree {
    /// Create an empty tree.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Whether the tree has no top-level entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over top-level entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &StateNode)> {
        self.0.iter()
    }

    /// Look up the node at `path`.
    pub fn get(&self, path: &FieldPath) -> Option<&StateNode> {
        let (first, rest) = path.segments().split_first()?;
        let mut node = self.0.get(first)?;
        for segment in rest {
            match node {
                StateNode::Category(tree) => node = tree.0.get(segment)?,
                StateNode::Value(_) => return None,
            }
        }
        Some(node)
    }

    /// Look up the leaf value at `path`, ignoring categories.
    pub fn value(&self, path: &FieldPath) -> Option<&FieldValue> {
        match self.get(path)? {
            StateNode::Value(value) => Some(value),
            StateNode::Category(_) => None,
        }
    }

    /// Whether any node (leaf or category) exists at `path`.
    pub fn contains(&self, path: &FieldPath) -> bool {
        self.get(path).is_some()
    }

    /// Set the leaf at `path`, creating intermediate categories.
    ///
    /// A leaf sitting where a category is needed is replaced by an empty
    /// category; a category sitting at the target is replaced by the leaf.
    pub fn set(&mut self, path: &FieldPath, value: FieldValue) {
        let Some((leaf, parents)) = path.segments().split_last() else {
            return;
        };
        let mut map = &mut self.0;
        for segment in parents {
            let entry = map
                .entry(segment.clone())
                .or_insert_with(|| StateNode::Category(Self::new()));
            if let StateNode::Value(_) = entry {
                *entry = StateNode::Category(Self::new());
            }
            map = match entry {
                StateNode::Category(tree) => &mut tree.0,
                StateNode::Value(_) => return,
            };
        }
        map.insert(leaf.clone(), StateNode::Value(value));
    }

    /// Remove the node at `path` and prune ancestors this leaves empty.
    ///
    /// Returns the removed node, or `None` if nothing was there.
    pub fn remove(&mut self, path: &FieldPath) -> Option<StateNode> {
        remove_in(&mut self.0, path.segments())
    }

    /// Every leaf with its full path, in depth-first key order.
    pub fn leaves(&self) -> Vec<(FieldPath, &FieldValue)> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        collect_leaves(&self.0, &mut prefix, &mut out);
        out
    }
}

fn remove_in(map: &mut BTreeMap<String, StateNode>, segments: &[String]) -> Option<StateNode> {
    let (first, rest) = segments.split_first()?;
    if rest.is_empty() {
        return map.remove(first);
    }
    let StateNode::Category(child) = map.get_mut(first)? else {
        return None;
    };
    let removed = remove_in(&mut child.0, rest);
    if removed.is_some() && child.0.is_empty() {
        map.remove(first);
    }
    removed
}

fn collect_leaves<'a>(
    map: &'a BTreeMap<String, StateNode>,
    prefix: &mut Vec<String>,
    out: &mut Vec<(FieldPath, &'a FieldValue)>,
) {
    for (key, node) in map {
        prefix.push(key.clone());
        match node {
            StateNode::Value(value) => {
                if let Ok(path) = FieldPath::from_segments(prefix.iter().cloned()) {
                    out.push((path, value));
                }
            }
            StateNode::Category(tree) => collect_leaves(&tree.0, prefix, out),
        }
        prefix.pop();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn path(text: &str) -> FieldPath {
        FieldPath::parse(text).unwrap()
    }

    #[test]
    fn parse_splits_and_trims_segments() {
        let p = path(" stats . HP ");
        assert_eq!(p.segments(), ["stats", "HP"]);
        assert_eq!(p.to_string(), "stats.HP");
        assert_eq!(p.depth(), 2);
    }

    #[test]
    fn parse_rejects_empty_and_gapped_paths() {
        assert_eq!(FieldPath::parse("   "), Err(ValidationError::EmptyPath));
        assert!(matches!(
            FieldPath::parse("stats..HP"),
            Err(ValidationError::EmptySegment { .. })
        ));
        assert!(matches!(
            FieldPath::parse(".HP"),
            Err(ValidationError::EmptySegment { .. })
        ));
    }

    #[test]
    fn from_segments_rejects_embedded_separator() {
        assert!(FieldPath::from_segments(["stats", "H.P"]).is_err());
        assert!(FieldPath::from_segments(Vec::<String>::new()).is_err());
        assert_eq!(
            FieldPath::from_segments(["stats", "HP"]).ok(),
            Some(path("stats.HP"))
        );
    }

    #[test]
    fn prefix_is_segment_aware() {
        assert!(path("stats").is_prefix_of(&path("stats.HP")));
        assert!(path("stats.HP").is_prefix_of(&path("stats.HP")));
        assert!(!path("stats").is_prefix_of(&path("statsX.HP")));
        assert!(!path("stats.HP").is_prefix_of(&path("stats")));
    }

    #[test]
    fn path_serializes_as_dotted_string() {
        let json = serde_json::to_string(&path("spells.fire.Firebolt")).unwrap();
        assert_eq!(json, "\"spells.fire.Firebolt\"");
        let bad: Result<FieldPath, _> = serde_json::from_str("\"a..b\"");
        assert!(bad.is_err());
    }

    #[test]
    fn field_value_is_untagged_on_the_wire() {
        let values: Vec<FieldValue> =
            serde_json::from_str(r#"[50, "Sword", true, -2.5]"#).unwrap();
        assert_eq!(
            values,
            vec![
                FieldValue::Number(50.0),
                FieldValue::Text(String::from("Sword")),
                FieldValue::Boolean(true),
                FieldValue::Number(-2.5),
            ]
        );
    }

    #[test]
    fn set_creates_categories_and_replaces_leaves() {
        let mut tree = StateTree::new();
        tree.set(&path("stats.HP"), FieldValue::Number(50.0));
        tree.set(&path("name"), FieldValue::from("Aria"));
        assert_eq!(tree.value(&path("stats.HP")), Some(&FieldValue::Number(50.0)));

        // A leaf in the way of a deeper path becomes a category.
        tree.set(&path("name.first"), FieldValue::from("Aria"));
        assert!(matches!(tree.get(&path("name")), Some(StateNode::Category(_))));

        // A category at the target is replaced by the leaf.
        tree.set(&path("stats"), FieldValue::Boolean(false));
        assert_eq!(tree.value(&path("stats")), Some(&FieldValue::Boolean(false)));
        assert!(!tree.contains(&path("stats.HP")));
    }

    #[test]
    fn remove_prunes_empty_ancestors_only() {
        let mut tree = StateTree::new();
        tree.set(&path("inventory.weapons.sword"), FieldValue::Number(1.0));
        tree.set(&path("inventory.gold"), FieldValue::Number(30.0));

        assert!(tree.remove(&path("inventory.weapons.sword")).is_some());
        assert!(!tree.contains(&path("inventory.weapons")));
        assert!(tree.contains(&path("inventory.gold")));

        assert!(tree.remove(&path("inventory.gold")).is_some());
        assert!(tree.is_empty());

        assert!(tree.remove(&path("missing.leaf")).is_none());
    }

    #[test]
    fn tree_serializes_as_nested_objects() {
        let mut tree = StateTree::new();
        tree.set(&path("stats.HP"), FieldValue::Number(60.0));
        tree.set(&path("alive"), FieldValue::Boolean(true));
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json, serde_json::json!({"alive": true, "stats": {"HP": 60.0}}));

        let back: StateTree = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn leaves_lists_full_paths() {
        let mut tree = StateTree::new();
        tree.set(&path("stats.HP"), FieldValue::Number(1.0));
        tree.set(&path("stats.MP"), FieldValue::Number(2.0));
        let leaves: Vec<String> = tree.leaves().iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(leaves, ["stats.HP", "stats.MP"]);
    }
}
