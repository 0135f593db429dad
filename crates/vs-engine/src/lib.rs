//! # vs-engine
//!
//! The encoding engine seam for vidshrink.
//!
//! This crate provides:
//!
//! - **Backend contract** ([`EngineBackend`]) -- the opaque engine capability:
//!   one-time load, named working-storage files, and command execution that
//!   reports progress ticks and log lines through an [`EventSink`].
//! - **Engine handle** ([`EngineHandle`]) -- owns one backend, coalesces
//!   concurrent loads, guards every operation on readiness, and fans engine
//!   events out to subscribers.
//! - **Command building** ([`TranscodeCommand`]) -- the fixed transcode
//!   argument list derived from [`vs_core::config::TranscodeConfig`].
//! - **ffmpeg backend** ([`FfmpegBackend`]) -- drives the system `ffmpeg` and
//!   `ffprobe` binaries inside a temporary [`Workspace`].

pub mod backend;
pub mod command;
pub mod ffmpeg;
pub mod handle;
pub mod progress;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use backend::{EngineBackend, EngineEvent, EventSink};
pub use command::TranscodeCommand;
pub use ffmpeg::FfmpegBackend;
pub use handle::{EngineHandle, LoadFailure, LoadState};
pub use progress::ProgressParser;
pub use tools::EngineAssets;
pub use workspace::Workspace;
