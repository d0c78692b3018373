//! Validation errors raised at the command boundary.
//!
//! Everything that can be rejected before it reaches a store lives here so
//! the tracker, the persistence layer, and the command surface share one
//! vocabulary for malformed input.

/// Input rejected before any store is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// An entity name was empty after trimming whitespace.
    #[error("name must not be empty")]
    EmptyName,

    /// A field path had no segments at all.
    #[error("field path must not be empty")]
    EmptyPath,

    /// A field path contained an empty segment (e.g. `stats..HP`).
    #[error("field path {path:?} contains an empty segment")]
    EmptySegment {
        /// The offending path as written.
        path: String,
    },

    /// A marker was submitted without any field changes.
    #[error("a marker needs at least one field change")]
    EmptyChanges,

    /// A numeric value was NaN or infinite.
    #[error("value for {path} is not a finite number")]
    NonFiniteNumber {
        /// Dotted path of the change carrying the bad number.
        path: String,
    },
}
