//! Owned handle to a single engine instance.
//!
//! [`EngineHandle`] wraps an [`EngineBackend`] with a load-state cell. The
//! first `load()` call performs the real work while concurrent callers wait
//! on the same attempt; every file and execute operation is refused until the
//! handle is [`LoadState::Ready`].

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use vs_core::{Error, Result};

use crate::backend::{EngineBackend, EngineEvent, EventSink, LogCapture};

/// Load lifecycle of an [`EngineHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Ready,
    /// The last attempt failed; calling `load()` again starts a new one.
    LoadFailed(LoadFailure),
}

/// Why a load attempt failed. Shared by every caller of that attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadFailure {
    AssetFetch { asset: String, message: String },
    Init { message: String },
}

impl LoadFailure {
    fn from_error(err: Error) -> Self {
        match err {
            Error::AssetFetchFailed { asset, message } => LoadFailure::AssetFetch { asset, message },
            Error::EngineInitFailed(message) => LoadFailure::Init { message },
            other => LoadFailure::Init {
                message: other.to_string(),
            },
        }
    }

    /// The error every caller of the failed attempt observes.
    pub fn to_error(&self) -> Error {
        match self {
            LoadFailure::AssetFetch { asset, message } => Error::asset_fetch(asset, message),
            LoadFailure::Init { message } => Error::engine_init(message),
        }
    }
}

/// Resets the state cell if a load attempt is dropped before it settles, so
/// waiters are not left parked on `Loading`.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<LoadState>,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_replace(LoadState::Unloaded);
        }
    }
}

/// Arms log capture for one `execute` call and disarms it on every exit path.
struct CaptureGuard<'a> {
    capture: &'a LogCapture,
}

impl<'a> CaptureGuard<'a> {
    fn arm(capture: &'a LogCapture) -> Self {
        *capture.lock() = Some(Vec::new());
        Self { capture }
    }

    fn finish(self) -> Vec<String> {
        self.capture.lock().take().unwrap_or_default()
    }
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        self.capture.lock().take();
    }
}

/// Handle owning one engine backend.
///
/// Construct it once and share it (`Arc<EngineHandle>`) with the
/// orchestrator; tests construct isolated handles around scripted backends.
pub struct EngineHandle {
    backend: Arc<dyn EngineBackend>,
    state: watch::Sender<LoadState>,
    events: broadcast::Sender<EngineEvent>,
    capture: LogCapture,
}

impl EngineHandle {
    /// Wrap a backend. `event_capacity` sizes the engine event channel.
    pub fn new(backend: impl EngineBackend + 'static, event_capacity: usize) -> Self {
        Self::from_arc(Arc::new(backend), event_capacity)
    }

    /// Wrap an already shared backend.
    pub fn from_arc(backend: Arc<dyn EngineBackend>, event_capacity: usize) -> Self {
        let (state, _) = watch::channel(LoadState::Unloaded);
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            backend,
            state,
            events,
            capture: Arc::new(Mutex::new(None)),
        }
    }

    /// Name of the wrapped backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Current load state.
    pub fn load_state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    /// Whether engine operations are currently allowed.
    pub fn is_ready(&self) -> bool {
        matches!(*self.state.borrow(), LoadState::Ready)
    }

    /// Watch load-state changes.
    pub fn watch_state(&self) -> watch::Receiver<LoadState> {
        self.state.subscribe()
    }

    /// Subscribe to engine progress and log events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Load the engine.
    ///
    /// Idempotent: once `Ready`, returns immediately. Concurrent callers while
    /// a load is in flight wait for that attempt and observe its outcome.
    /// After a failure, the next call starts a fresh attempt.
    pub async fn load(&self) -> Result<()> {
        loop {
            let mut claimed = false;
            self.state.send_if_modified(|state| match state {
                LoadState::Unloaded | LoadState::LoadFailed(_) => {
                    *state = LoadState::Loading;
                    claimed = true;
                    true
                }
                LoadState::Loading | LoadState::Ready => false,
            });

            if claimed {
                return self.run_load().await;
            }

            let mut rx = self.state.subscribe();
            let settled = rx
                .wait_for(|s| !matches!(s, LoadState::Loading))
                .await
                .map(|s| s.clone())
                .map_err(|_| Error::Internal("engine state channel closed".into()))?;

            match settled {
                LoadState::Ready => return Ok(()),
                LoadState::LoadFailed(failure) => return Err(failure.to_error()),
                // The attempt we waited on was abandoned; try to claim it.
                LoadState::Unloaded | LoadState::Loading => continue,
            }
        }
    }

    async fn run_load(&self) -> Result<()> {
        let mut guard = LoadingGuard {
            state: &self.state,
            armed: true,
        };
        tracing::info!(backend = self.backend.name(), "Loading engine");

        let sink = EventSink::new(self.events.clone(), self.capture.clone());
        let outcome = self.backend.load(sink).await;
        guard.armed = false;

        match outcome {
            Ok(()) => {
                self.state.send_replace(LoadState::Ready);
                tracing::info!(backend = self.backend.name(), "Engine ready");
                Ok(())
            }
            Err(e) => {
                let failure = LoadFailure::from_error(e);
                let err = failure.to_error();
                tracing::warn!(backend = self.backend.name(), error = %err, "Engine load failed");
                self.state.send_replace(LoadState::LoadFailed(failure));
                Err(err)
            }
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(Error::EngineNotReady)
        }
    }

    /// Stage input bytes in the engine's working storage.
    pub async fn write_input(&self, name: &str, data: Bytes) -> Result<()> {
        self.ensure_ready()?;
        tracing::debug!(name, bytes = data.len(), "Writing engine input");
        self.backend.write_file(name, data).await
    }

    /// Run a command to completion.
    ///
    /// A non-zero exit status becomes [`Error::EncodeFailed`] carrying the
    /// log lines emitted during this call; its message is the last non-empty
    /// line, or the exit status when the engine logged nothing.
    pub async fn execute(&self, args: &[String]) -> Result<()> {
        self.ensure_ready()?;
        tracing::debug!(args = ?args, "Executing engine command");

        let capture = CaptureGuard::arm(&self.capture);
        let status = self.backend.exec(args).await;
        let log_lines = capture.finish();

        match status? {
            0 => Ok(()),
            code => {
                let message = log_lines
                    .iter()
                    .rev()
                    .map(|l| l.trim())
                    .find(|l| !l.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("engine exited with status {code}"));
                Err(Error::encode_failed(message, log_lines))
            }
        }
    }

    /// Fetch an artifact produced by [`execute`](Self::execute).
    pub async fn read_output(&self, name: &str) -> Result<Bytes> {
        self.ensure_ready()?;
        let data = self.backend.read_file(name).await?;
        tracing::debug!(name, bytes = data.len(), "Read engine output");
        Ok(data)
    }
}
