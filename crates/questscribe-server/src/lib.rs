//! HTTP command surface for the QuestScribe state tracker.
//!
//! The editor drives the tracker entirely through this Axum server: one
//! JSON route per command (entities, markers, state queries, and the
//! document lifecycle). All commands run against a single
//! [`questscribe_tracker::Project`] behind a `tokio` read-write lock.
//!
//! # Architecture
//!
//! Mutations take the write lock for one command, so a cascade delete or a
//! global field deletion is never observed half-done. State queries share
//! the read lock. Saving snapshots the project under the read lock and
//! writes on the blocking pool; loading parses off-lock and swaps the new
//! project in under the write lock.

pub mod document;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

// Re-export primary types for convenience.
pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::{AppState, DocumentStatus, LoadedDocument};
