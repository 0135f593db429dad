//! vs-core: shared types, IDs, errors, configuration, and job events.
//!
//! This crate is the foundational dependency for the other vidshrink crates,
//! providing the typed job identifier, a unified error type, application
//! configuration, and a broadcast event bus for job notifications.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod job;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, ErrorKind, Result};
pub use ids::*;
pub use job::{JobFailure, JobState};
