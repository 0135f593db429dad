//! Single-job compression orchestrator.
//!
//! An [`Orchestrator`] owns the busy slot of one [`EngineHandle`]. Each
//! accepted submission becomes a [`Job`](job::Job) driven by a background
//! task through `WritingInput → Encoding → ReadingOutput → Completed`. The
//! task holds the slot until the job reaches a terminal state, translates
//! engine progress and log events into job updates, and publishes everything
//! on the shared [`EventBus`].
//!
//! Cancellation is best-effort: the task stops observing the in-flight
//! engine operation (dropping its future) and releases the slot. Backends
//! that cannot abort may finish in the background; their result is ignored.

mod job;
mod result;

pub use job::{JobOutcome, JobSnapshot};
pub use result::{CompressionRatio, ResultProjection};

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use vs_core::config::{JobConfig, TranscodeConfig};
use vs_core::events::{EventBus, JobEvent, JobEventPayload};
use vs_core::{Error, JobFailure, JobId, JobState, Result};
use vs_engine::{EngineEvent, EngineHandle, TranscodeCommand};

use job::Job;

/// State shared between a job's runner task and its handles.
struct JobShared {
    job: RwLock<Job>,
    state: watch::Sender<JobState>,
}

/// Runs compression jobs one at a time against a single engine.
pub struct Orchestrator {
    engine: Arc<EngineHandle>,
    transcode: TranscodeConfig,
    command: Arc<[String]>,
    limits: JobConfig,
    events: Arc<EventBus>,
    slot: Arc<tokio::sync::Mutex<()>>,
    current: Mutex<Option<Arc<JobShared>>>,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<EngineHandle>,
        transcode: TranscodeConfig,
        limits: JobConfig,
        events: Arc<EventBus>,
    ) -> Self {
        let command = TranscodeCommand::compress(&transcode).into_args().into();
        Self {
            engine,
            transcode,
            command,
            limits,
            events,
            slot: Arc::new(tokio::sync::Mutex::new(())),
            current: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<EngineHandle> {
        &self.engine
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// The engine command line every job runs.
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Whether a job currently holds the engine.
    pub fn is_busy(&self) -> bool {
        self.slot.try_lock().is_err()
    }

    /// Snapshot of the most recently accepted job, if any.
    pub fn current_job(&self) -> Option<JobSnapshot> {
        self.current.lock().as_ref().map(|s| s.job.read().snapshot())
    }

    /// Accept `input` as a new job and start driving it.
    ///
    /// Never queues. Fails immediately with [`Error::EngineNotReady`] when
    /// the engine is not loaded, [`Error::InputTooLarge`] when `input`
    /// exceeds the configured ceiling, and [`Error::EngineBusy`] while an
    /// earlier job is still running. A rejected submission creates no job
    /// and never touches the engine.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, input: Bytes) -> Result<JobHandle> {
        if !self.engine.is_ready() {
            return Err(Error::EngineNotReady);
        }

        let size = input.len() as u64;
        let max = self.limits.max_input_bytes;
        if size > max {
            tracing::warn!(size, max, "Rejecting oversized input");
            return Err(Error::InputTooLarge { size, max });
        }

        let slot = self
            .slot
            .clone()
            .try_lock_owned()
            .map_err(|_| Error::EngineBusy)?;

        let id = JobId::new();
        let (state, _) = watch::channel(JobState::Created);
        let shared = Arc::new(JobShared {
            job: RwLock::new(Job::new(id, size, self.limits.max_log_lines)),
            state,
        });
        let cancel = CancellationToken::new();

        // Subscribe before the runner starts so no event is missed.
        let handle = JobHandle {
            id,
            shared: shared.clone(),
            cancel: cancel.clone(),
            events: self.events.subscribe(),
            finished: false,
        };

        let runner = JobRunner {
            id,
            engine: self.engine.clone(),
            engine_events: self.engine.subscribe(),
            engine_open: true,
            input_name: self.transcode.input_name.clone(),
            output_name: self.transcode.output_name.clone(),
            command: self.command.clone(),
            shared: shared.clone(),
            bus: self.events.clone(),
            cancel,
            slot: Some(slot),
        };
        *self.current.lock() = Some(shared);

        tracing::info!(job_id = %id, bytes = size, "Job submitted");
        tokio::spawn(runner.run(input));

        Ok(handle)
    }
}

/// Caller-side handle to one submitted job.
///
/// Dropping the handle does not cancel the job.
pub struct JobHandle {
    id: JobId,
    shared: Arc<JobShared>,
    cancel: CancellationToken,
    events: broadcast::Receiver<JobEvent>,
    finished: bool,
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn state(&self) -> JobState {
        *self.shared.state.borrow()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.shared.job.read().snapshot()
    }

    /// Request cancellation. Has no effect once the job is terminal.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Next event published for this job, in order. Returns `None` after the
    /// terminal event has been delivered.
    pub async fn next_event(&mut self) -> Option<JobEventPayload> {
        if self.finished {
            return None;
        }
        loop {
            match self.events.recv().await {
                Ok(event) if event.payload.job_id() == self.id => {
                    self.finished = event.payload.is_terminal();
                    return Some(event.payload);
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(job_id = %self.id, skipped = n, "Job event receiver lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Wait for the job to reach a terminal state.
    pub async fn wait(&self) -> JobOutcome {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|s| s.is_terminal()).await;
        let outcome = self.shared.job.read().outcome();
        outcome.unwrap_or_else(|| {
            JobOutcome::Failed(JobFailure::from_error(
                &Error::Internal("job ended without an outcome".into()),
                Vec::new(),
            ))
        })
    }
}

/// Why a pipeline stopped early.
enum Stop {
    Cancelled,
    Failed(Error),
}

impl From<Error> for Stop {
    fn from(err: Error) -> Self {
        Stop::Failed(err)
    }
}

struct JobRunner {
    id: JobId,
    engine: Arc<EngineHandle>,
    engine_events: broadcast::Receiver<EngineEvent>,
    engine_open: bool,
    input_name: String,
    output_name: String,
    command: Arc<[String]>,
    shared: Arc<JobShared>,
    bus: Arc<EventBus>,
    cancel: CancellationToken,
    /// Held until the job is terminal.
    slot: Option<OwnedMutexGuard<()>>,
}

impl JobRunner {
    async fn run(mut self, input: Bytes) {
        let outcome = match self.pipeline(input).await {
            Ok(result) => {
                tracing::info!(job_id = %self.id, "{result}");
                JobOutcome::Completed(result)
            }
            Err(Stop::Cancelled) => {
                tracing::info!(job_id = %self.id, "Job cancelled");
                JobOutcome::Cancelled
            }
            Err(Stop::Failed(err)) => self.failed(err),
        };
        self.finish(outcome);
    }

    fn failed(&self, err: Error) -> JobOutcome {
        let logs = self.shared.job.read().log_lines();
        tracing::error!(job_id = %self.id, error = %err, "Job failed");
        JobOutcome::Failed(JobFailure::from_error(&err, logs))
    }

    async fn pipeline(&mut self, input: Bytes) -> std::result::Result<Arc<ResultProjection>, Stop> {
        let engine = self.engine.clone();
        let command = self.command.clone();
        let (input_name, output_name) = (self.input_name.clone(), self.output_name.clone());
        let original_size = input.len() as u64;

        self.advance(JobState::WritingInput)?;
        self.stage(engine.write_input(&input_name, input)).await?;

        self.advance(JobState::Encoding)?;
        self.stage(engine.execute(&command)).await?;

        self.advance(JobState::ReadingOutput)?;
        let output = self.stage(engine.read_output(&output_name)).await?;

        Ok(Arc::new(ResultProjection::new(original_size, output)))
    }

    /// Drive one engine operation while forwarding engine events, until it
    /// finishes or the job is cancelled.
    async fn stage<T>(&mut self, op: impl Future<Output = Result<T>>) -> std::result::Result<T, Stop> {
        tokio::pin!(op);
        let result = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Stop::Cancelled),
                event = self.engine_events.recv(), if self.engine_open => match event {
                    Ok(event) => self.apply(event),
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(job_id = %self.id, skipped = n, "Engine event receiver lagged");
                    }
                    Err(RecvError::Closed) => self.engine_open = false,
                },
                result = &mut op => break result,
            }
        };
        self.drain();
        Ok(result?)
    }

    /// Apply engine events emitted before the operation returned.
    fn drain(&mut self) {
        loop {
            match self.engine_events.try_recv() {
                Ok(event) => self.apply(event),
                Err(TryRecvError::Lagged(n)) => {
                    tracing::warn!(job_id = %self.id, skipped = n, "Engine event receiver lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    fn apply(&self, event: EngineEvent) {
        match event {
            EngineEvent::Progress { fraction } => {
                let percent = self.shared.job.write().record_progress(fraction);
                if let Some(percent) = percent {
                    self.bus.broadcast(JobEventPayload::Progress {
                        job_id: self.id,
                        percent,
                    });
                }
            }
            EngineEvent::Log { line } => {
                tracing::debug!(job_id = %self.id, "engine: {line}");
                self.shared.job.write().push_log(line.clone());
                self.bus.broadcast(JobEventPayload::Log {
                    job_id: self.id,
                    line,
                });
            }
        }
    }

    fn advance(&self, to: JobState) -> std::result::Result<(), Stop> {
        if self.cancel.is_cancelled() {
            return Err(Stop::Cancelled);
        }
        let from = self.shared.job.write().advance(to)?;
        tracing::debug!(job_id = %self.id, %from, %to, "Job state changed");
        self.shared.state.send_replace(to);
        self.bus.broadcast(JobEventPayload::StateChanged {
            job_id: self.id,
            from,
            to,
        });
        Ok(())
    }

    /// Record the terminal state, release the engine, then notify observers.
    /// Waiters wake last so the terminal events are already published.
    fn finish(&mut self, outcome: JobOutcome) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        let terminal = match &outcome {
            JobOutcome::Completed(result) => JobEventPayload::Completed {
                job_id: self.id,
                original_size_bytes: result.original_size_bytes(),
                compressed_size_bytes: result.compressed_size_bytes(),
                compression_ratio_percent: result.compression_ratio().percent(),
            },
            JobOutcome::Failed(failure) => JobEventPayload::Failed {
                job_id: self.id,
                kind: failure.kind,
                message: failure.message.clone(),
            },
            JobOutcome::Cancelled => JobEventPayload::Cancelled { job_id: self.id },
        };
        let to = outcome.state();

        let transition = self.shared.job.write().finish(outcome);
        drop(slot);

        match transition {
            Ok(from) => {
                self.bus.broadcast(JobEventPayload::StateChanged {
                    job_id: self.id,
                    from,
                    to,
                });
                self.bus.broadcast(terminal);
                self.shared.state.send_replace(to);
            }
            Err(e) => tracing::error!(job_id = %self.id, error = %e, "Could not finish job"),
        }
    }
}

impl Drop for JobRunner {
    /// A runner that unwinds or is dropped mid-pipeline still leaves its job
    /// in a terminal state.
    fn drop(&mut self) {
        if self.slot.is_none() {
            return;
        }
        let reason = if std::thread::panicking() {
            "job runner panicked"
        } else {
            "job runner stopped before the job finished"
        };
        let outcome = self.failed(Error::Internal(reason.into()));
        self.finish(outcome);
    }
}
