//! The [`EngineBackend`] trait defines the opaque encoding engine.
//!
//! A backend loads its assets once, stages and fetches named buffers in its
//! own working storage, and runs command lines to completion. While a command
//! runs it reports progress ticks and log lines through the [`EventSink`] it
//! was handed at load time.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// A notification emitted by the engine while it works.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Fractional completion of the running command, in `0.0..=1.0`.
    Progress { fraction: f64 },
    /// One line of free-text engine output.
    Log { line: String },
}

/// Log lines collected during a single `execute` call.
pub(crate) type LogCapture = Arc<Mutex<Option<Vec<String>>>>;

/// Long-lived event channel handed to a backend when it loads.
///
/// The sink stays valid for the lifetime of the owning
/// [`EngineHandle`](crate::EngineHandle); events are delivered to whichever
/// job is subscribed at the time.
#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<EngineEvent>,
    capture: LogCapture,
}

impl EventSink {
    pub(crate) fn new(tx: broadcast::Sender<EngineEvent>, capture: LogCapture) -> Self {
        Self { tx, capture }
    }

    /// Create a standalone sink and a receiver for it.
    ///
    /// Useful for exercising a backend without an [`EngineHandle`](crate::EngineHandle).
    pub fn channel(capacity: usize) -> (Self, broadcast::Receiver<EngineEvent>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self::new(tx, Arc::new(Mutex::new(None))), rx)
    }

    /// Report fractional progress. Non-finite values are dropped and the rest
    /// are clamped to `0.0..=1.0`.
    pub fn progress(&self, fraction: f64) {
        if !fraction.is_finite() {
            return;
        }
        let _ = self.tx.send(EngineEvent::Progress {
            fraction: fraction.clamp(0.0, 1.0),
        });
    }

    /// Report one line of engine output.
    pub fn log(&self, line: impl Into<String>) {
        let line = line.into();
        if let Some(captured) = self.capture.lock().as_mut() {
            captured.push(line.clone());
        }
        let _ = self.tx.send(EngineEvent::Log { line });
    }
}

/// The encoding engine capability.
///
/// Backends are not reentrant: callers serialize access so that at most one
/// `write_file`/`exec`/`read_file` sequence is in flight at a time.
#[async_trait]
pub trait EngineBackend: Send + Sync {
    /// A short, human-readable name for this backend (e.g. "ffmpeg").
    fn name(&self) -> &'static str;

    /// Fetch and initialize the engine's assets.
    ///
    /// Fails with [`vs_core::Error::AssetFetchFailed`] when an asset cannot be
    /// retrieved and [`vs_core::Error::EngineInitFailed`] when the engine
    /// rejects them.
    async fn load(&self, events: EventSink) -> vs_core::Result<()>;

    /// Store `data` under `name` in the engine's working storage.
    async fn write_file(&self, name: &str, data: Bytes) -> vs_core::Result<()>;

    /// Run a command line to completion and return its exit status.
    async fn exec(&self, args: &[String]) -> vs_core::Result<i32>;

    /// Read the buffer stored under `name`.
    ///
    /// Fails with [`vs_core::Error::OutputMissing`] if nothing was stored.
    async fn read_file(&self, name: &str) -> vs_core::Result<Bytes>;
}
