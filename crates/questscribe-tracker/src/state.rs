//! Point-in-time state computation.
//!
//! [`StateComputer`] folds an entity's markers up to a document position into
//! a fresh [`StateTree`]. The fold is pure: it borrows both stores and never
//! writes to either, so repeated calls return identical trees. Relative
//! results stay finite: an overflow is clamped to the largest finite value
//! of the same sign.

use questscribe_types::{ChangeKind, EntityId, FieldPath, FieldValue, MarkerId, StateNode, StateTree};
use serde::Serialize;

use crate::entity_store::EntityStore;
use crate::error::TrackerError;
use crate::marker_store::MarkerStore;

/// A relative change that found something other than a number at its path
/// and treated it as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Coercion {
    /// The marker carrying the relative change.
    pub marker_id: MarkerId,
    /// The path the change targets.
    pub field_path: FieldPath,
    /// What was found there: `text`, `boolean` or `category`.
    pub found: &'static str,
}

/// A relative change whose result left the finite range and was clamped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Saturation {
    /// The marker carrying the relative change.
    pub marker_id: MarkerId,
    /// The path the change targets.
    pub field_path: FieldPath,
    /// The value stored instead: `f64::MAX` or `f64::MIN`.
    pub clamped_to: f64,
}

/// A computed tree with the diagnostics raised while building it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComputedState {
    /// The entity's state at the queried position.
    pub tree: StateTree,
    /// Relative changes applied to non-numeric values.
    pub coercions: Vec<Coercion>,
    /// Relative changes that overflowed.
    pub saturations: Vec<Saturation>,
}

/// Read-only view over both stores that answers state queries.
#[derive(Debug, Clone, Copy)]
pub struct StateComputer<'a> {
    entities: &'a EntityStore,
    markers: &'a MarkerStore,
}

impl<'a> StateComputer<'a> {
    /// Borrow the stores for a query.
    pub const fn new(entities: &'a EntityStore, markers: &'a MarkerStore) -> Self {
        Self { entities, markers }
    }

    /// State of `entity_id` after every marker at or before `position`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::EntityNotFound`] for an unknown entity.
    pub fn compute(&self, entity_id: EntityId, position: u64) -> Result<StateTree, TrackerError> {
        self.compute_detailed(entity_id, position)
            .map(|computed| computed.tree)
    }

    /// Like [`StateComputer::compute`], also reporting coercions.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::EntityNotFound`] for an unknown entity.
    pub fn compute_detailed(
        &self,
        entity_id: EntityId,
        position: u64,
    ) -> Result<ComputedState, TrackerError> {
        self.entities.require(entity_id)?;
        let mut state = ComputedState::default();
        for marker in self.markers.for_entity_up_to(entity_id, position) {
            for change in &marker.changes {
                let path = &change.field_path;
                match &change.kind {
                    ChangeKind::Absolute(value) => state.tree.set(path, value.clone()),
                    ChangeKind::Relative(delta) => {
                        let current = match state.tree.get(path) {
                            None => 0.0,
                            Some(StateNode::Value(FieldValue::Number(n))) => *n,
                            Some(other) => {
                                state.coercions.push(Coercion {
                                    marker_id: marker.id,
                                    field_path: path.clone(),
                                    found: node_kind(other),
                                });
                                0.0
                            }
                        };
                        #[allow(clippy::arithmetic_side_effects)]
                        let sum = current + delta;
                        let next = if sum.is_finite() {
                            sum
                        } else {
                            let clamped = if sum.is_sign_negative() {
                                f64::MIN
                            } else {
                                f64::MAX
                            };
                            state.saturations.push(Saturation {
                                marker_id: marker.id,
                                field_path: path.clone(),
                                clamped_to: clamped,
                            });
                            clamped
                        };
                        state.tree.set(path, FieldValue::Number(next));
                    }
                    ChangeKind::Remove => {
                        state.tree.remove(path);
                    }
                }
            }
        }
        Ok(state)
    }
}

const fn node_kind(node: &StateNode) -> &'static str {
    match node {
        StateNode::Value(value) => value.kind_name(),
        StateNode::Category(_) => "category",
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

    struct Fixture {
        entities: EntityStore,
        markers: MarkerStore,
        hero: EntityId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut entities = EntityStore::new();
            let hero = entities.create("Aria", "#f00").unwrap().id;
            Self {
                entities,
                markers: MarkerStore::new(),
                hero,
            }
        }

        fn mark(&mut self, position: u64, changes: Vec<FieldChange>) -> MarkerId {
            self.markers
                .insert(
                    &mut self.entities,
                    NewMarker {
                        entity_id: self.hero,
                        position,
                        changes,
                        visual: MarkerVisual::default(),
                        description: None,
                    },
                )
                .unwrap()
                .id
        }

        fn at(&self, position: u64) -> StateTree {
            StateComputer::new(&self.entities, &self.markers)
                .compute(self.hero, position)
                .unwrap()
        }

        fn hp(&self, position: u64) -> Option<f64> {
            self.at(position)
                .value(&path("stats.HP"))
                .and_then(FieldValue::as_number)
        }
    }

    #[test]
    fn position_filter_is_inclusive() {
        let mut fx = Fixture::new();
        fx.mark(10, vec![FieldChange::absolute(path("stats.HP"), 50.0)]);
        assert_eq!(fx.hp(9), None);
        assert_eq!(fx.hp(10), Some(50.0));
        assert!(fx.at(0).is_empty());
    }

    #[test]
    fn relative_changes_accumulate() {
        let mut fx = Fixture::new();
        fx.mark(10, vec![FieldChange::absolute(path("stats.HP"), 50.0)]);
        fx.mark(20, vec![FieldChange::relative(path("stats.HP"), 10.0)]);
        assert_eq!(fx.hp(25), Some(60.0));
        assert_eq!(fx.hp(15), Some(50.0));
    }

    #[test]
    fn remove_then_reset() {
        let mut fx = Fixture::new();
        fx.mark(10, vec![FieldChange::absolute(path("stats.HP"), 50.0)]);
        fx.mark(30, vec![FieldChange::remove(path("stats.HP"))]);
        fx.mark(40, vec![FieldChange::absolute(path("stats.HP"), 80.0)]);
        assert_eq!(fx.hp(35), None);
        assert!(!fx.at(35).contains(&path("stats")));
        assert_eq!(fx.hp(45), Some(80.0));
    }

    #[test]
    fn relative_on_absent_field_starts_from_zero() {
        let mut fx = Fixture::new();
        fx.mark(5, vec![FieldChange::relative(path("inventory.gold"), -3.0)]);
        let computed = StateComputer::new(&fx.entities, &fx.markers)
            .compute_detailed(fx.hero, 5)
            .unwrap();
        assert_eq!(
            computed.tree.value(&path("inventory.gold")),
            Some(&FieldValue::Number(-3.0))
        );
        assert!(computed.coercions.is_empty());
    }

    #[test]
    fn relative_on_text_is_coerced_and_reported() {
        let mut fx = Fixture::new();
        fx.mark(5, vec![FieldChange::absolute(path("title"), "Squire")]);
        let bump = fx.mark(6, vec![FieldChange::relative(path("title"), 2.0)]);
        let computed = StateComputer::new(&fx.entities, &fx.markers)
            .compute_detailed(fx.hero, 10)
            .unwrap();
        assert_eq!(computed.tree.value(&path("title")), Some(&FieldValue::Number(2.0)));
        assert_eq!(
            computed.coercions,
            vec![Coercion {
                marker_id: bump,
                field_path: path("title"),
                found: "text",
            }]
        );
    }

    #[test]
    fn relative_overflow_clamps_and_is_reported() {
        let mut fx = Fixture::new();
        fx.mark(1, vec![FieldChange::absolute(path("gold"), 1e308)]);
        let up = fx.mark(2, vec![FieldChange::relative(path("gold"), 1e308)]);
        fx.mark(3, vec![FieldChange::absolute(path("debt"), -1e308)]);
        let down = fx.mark(4, vec![FieldChange::relative(path("debt"), -1e308)]);

        let computed = StateComputer::new(&fx.entities, &fx.markers)
            .compute_detailed(fx.hero, 5)
            .unwrap();

        assert_eq!(computed.tree.value(&path("gold")), Some(&FieldValue::Number(f64::MAX)));
        assert_eq!(computed.tree.value(&path("debt")), Some(&FieldValue::Number(f64::MIN)));
        assert_eq!(
            computed.saturations,
            vec![
                Saturation {
                    marker_id: up,
                    field_path: path("gold"),
                    clamped_to: f64::MAX,
                },
                Saturation {
                    marker_id: down,
                    field_path: path("debt"),
                    clamped_to: f64::MIN,
                },
            ]
        );
        assert!(computed.coercions.is_empty());
    }

    #[test]
    fn changes_within_a_marker_apply_in_list_order() {
        let mut fx = Fixture::new();
        fx.mark(
            1,
            vec![
                FieldChange::absolute(path("stats.HP"), 10.0),
                FieldChange::relative(path("stats.HP"), 5.0),
                FieldChange::relative(path("stats.HP"), 5.0),
            ],
        );
        assert_eq!(fx.hp(1), Some(20.0));
    }

    #[test]
    fn same_position_folds_in_insertion_order() {
        let mut fx = Fixture::new();
        fx.mark(20, vec![FieldChange::absolute(path("stats.HP"), 1.0)]);
        fx.mark(20, vec![FieldChange::absolute(path("stats.HP"), 2.0)]);
        assert_eq!(fx.hp(20), Some(2.0));
    }

    #[test]
    fn compute_is_deterministic() {
        let mut fx = Fixture::new();
        fx.mark(1, vec![FieldChange::absolute(path("stats.HP"), 50.0)]);
        fx.mark(2, vec![FieldChange::absolute(path("inventory.weapon"), "Sword")]);
        fx.mark(3, vec![FieldChange::relative(path("stats.HP"), -7.5)]);
        assert_eq!(fx.at(100), fx.at(100));
    }

    #[test]
    fn other_entities_do_not_leak_in() {
        let mut fx = Fixture::new();
        let villain = fx.entities.create("Mordred", "#000").unwrap().id;
        fx.markers
            .insert(
                &mut fx.entities,
                NewMarker {
                    entity_id: villain,
                    position: 1,
                    changes: vec![FieldChange::absolute(path("stats.HP"), 999.0)],
                    visual: MarkerVisual::default(),
                    description: None,
                },
            )
            .unwrap();
        assert_eq!(fx.hp(100), None);
    }

    #[test]
    fn unknown_entity_is_not_found() {
        let fx = Fixture::new();
        let ghost = EntityId::new();
        assert_eq!(
            StateComputer::new(&fx.entities, &fx.markers).compute(ghost, 10),
            Err(TrackerError::EntityNotFound(ghost))
        );
    }
}
