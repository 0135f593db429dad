//! Unified error type for vidshrink.
//!
//! All crates funnel their failures into [`Error`]. Each variant maps to a
//! copyable [`ErrorKind`] so job snapshots and events can carry the failure
//! category without owning the original error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error type covering all failure modes in vidshrink.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An engine asset (binary) could not be located or retrieved.
    #[error("Asset fetch failed [{asset}]: {message}")]
    AssetFetchFailed {
        /// Name of the asset that could not be fetched.
        asset: String,
        /// Human-readable error description.
        message: String,
    },

    /// The engine rejected its assets during initialization.
    #[error("Engine init failed: {0}")]
    EngineInitFailed(String),

    /// An engine operation was attempted before the engine finished loading.
    #[error("Engine is not ready")]
    EngineNotReady,

    /// Another job is still holding the engine.
    #[error("Engine is busy with another job")]
    EngineBusy,

    /// The submitted input exceeds the configured size ceiling.
    #[error("Input too large: {size} bytes exceeds the {max} byte limit")]
    InputTooLarge {
        /// Size of the rejected input.
        size: u64,
        /// Configured ceiling.
        max: u64,
    },

    /// The engine finished the encode with a non-zero status.
    #[error("Encode failed: {message}")]
    EncodeFailed {
        /// Human-readable error description.
        message: String,
        /// Engine log lines captured during the failed attempt.
        log_lines: Vec<String>,
    },

    /// The encode did not produce the expected output artifact.
    #[error("Output missing: {name}")]
    OutputMissing {
        /// Name of the artifact in the engine's working storage.
        name: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Configuration or argument data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure category of an [`Error`], detached from its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AssetFetchFailed,
    EngineInitFailed,
    EngineNotReady,
    EngineBusy,
    InputTooLarge,
    EncodeFailed,
    OutputMissing,
    Io,
    Validation,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::AssetFetchFailed => "asset_fetch_failed",
            ErrorKind::EngineInitFailed => "engine_init_failed",
            ErrorKind::EngineNotReady => "engine_not_ready",
            ErrorKind::EngineBusy => "engine_busy",
            ErrorKind::InputTooLarge => "input_too_large",
            ErrorKind::EncodeFailed => "encode_failed",
            ErrorKind::OutputMissing => "output_missing",
            ErrorKind::Io => "io",
            ErrorKind::Validation => "validation",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl Error {
    /// The failure category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AssetFetchFailed { .. } => ErrorKind::AssetFetchFailed,
            Error::EngineInitFailed(_) => ErrorKind::EngineInitFailed,
            Error::EngineNotReady => ErrorKind::EngineNotReady,
            Error::EngineBusy => ErrorKind::EngineBusy,
            Error::InputTooLarge { .. } => ErrorKind::InputTooLarge,
            Error::EncodeFailed { .. } => ErrorKind::EncodeFailed,
            Error::OutputMissing { .. } => ErrorKind::OutputMissing,
            Error::Io { .. } => ErrorKind::Io,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether repeating the call that produced this error may succeed.
    ///
    /// Load failures are retried through `load()`; a busy or not-yet-ready
    /// engine clears once the engine settles. Job-level failures require a
    /// fresh submission and are not considered retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::AssetFetchFailed { .. }
                | Error::EngineInitFailed(_)
                | Error::EngineNotReady
                | Error::EngineBusy
        )
    }

    /// Log lines attached to this error, if any.
    pub fn log_lines(&self) -> &[String] {
        match self {
            Error::EncodeFailed { log_lines, .. } => log_lines,
            _ => &[],
        }
    }

    /// Convenience constructor for [`Error::AssetFetchFailed`].
    pub fn asset_fetch(asset: impl Into<String>, message: impl Into<String>) -> Self {
        Error::AssetFetchFailed {
            asset: asset.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::EngineInitFailed`].
    pub fn engine_init(message: impl Into<String>) -> Self {
        Error::EngineInitFailed(message.into())
    }

    /// Convenience constructor for [`Error::EncodeFailed`].
    pub fn encode_failed(message: impl Into<String>, log_lines: Vec<String>) -> Self {
        Error::EncodeFailed {
            message: message.into(),
            log_lines,
        }
    }

    /// Convenience constructor for [`Error::OutputMissing`].
    pub fn output_missing(name: impl fmt::Display) -> Self {
        Error::OutputMissing {
            name: name.to_string(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
