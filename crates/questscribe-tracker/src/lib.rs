//! State-tracking engine for QuestScribe.
//!
//! Entities and markers live in two in-memory stores owned by a single
//! [`Project`]. An entity's attributes at any document position are never
//! stored; they are recomputed by folding its markers up to that position.
//!
//! # Modules
//!
//! - [`entity_store`] -- Entities and their field schemas
//! - [`marker_store`] -- Markers, document ordering, and batch repositioning
//! - [`state`] -- The pure fold from markers to a [`StateTree`]
//! - [`project`] -- The aggregate the command surface locks and mutates
//! - [`error`] -- [`TrackerError`]
//!
//! [`StateTree`]: questscribe_types::StateTree

pub mod entity_store;
pub mod error;
pub mod marker_store;
pub mod project;
pub mod state;

pub use entity_store::{DeletedEntity, DeletedField, EntityStore};
pub use error::TrackerError;
pub use marker_store::{MarkerStore, MarkerUpdate, NewMarker, RepositionOutcome, RepositionUpdate};
pub use project::{Project, ProjectSnapshot, RestoredProject};
pub use state::{Coercion, ComputedState, Saturation, StateComputer};
