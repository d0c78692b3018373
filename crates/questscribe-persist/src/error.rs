//! Error types for the persistence layer.
//!
//! All errors are propagated via [`PersistError`], which keeps the path of
//! the file involved so the command surface can report it.

use std::path::PathBuf;

/// Errors that can occur while saving or loading a project file.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// The file could not be read, written, or renamed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file being accessed.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The file was readable but its contents are not a valid project.
    #[error("invalid project file: {0}")]
    Format(String),

    /// The file declares a format version this build cannot read.
    #[error("unsupported project format version {0}")]
    UnsupportedVersion(u64),

    /// Encoding the project to JSON failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PersistError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure is about file contents rather than file access.
    pub const fn is_format(&self) -> bool {
        matches!(self, Self::Format(_) | Self::UnsupportedVersion(_))
    }
}
