//! Persistence for QuestScribe projects.
//!
//! A project is saved as one JSON file holding both stores and the editor's
//! opaque document payload. Saves are atomic; loads validate every record
//! before a [`questscribe_tracker::Project`] is handed back.
//!
//! # Modules
//!
//! - [`project_file`] -- The versioned file layout, `save`, and `load`
//! - [`legacy`] -- Upgrade of first-release files
//! - [`atomic`] -- Temp-file-and-rename writes
//! - [`error`] -- [`PersistError`]

pub mod atomic;
pub mod error;
pub mod legacy;
pub mod project_file;

pub use error::PersistError;
pub use project_file::{FORMAT_VERSION, LoadedProject, ProjectFile, SourceFormat, load, save};
