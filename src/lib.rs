//! vidshrink - single-job video compression with live progress
//!
//! This library crate exposes the orchestrator for the CLI and for
//! integration testing.

pub mod orchestrator;

pub use orchestrator::{
    CompressionRatio, JobHandle, JobOutcome, JobSnapshot, Orchestrator, ResultProjection,
};
