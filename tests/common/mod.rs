//! Shared test harness for integration tests.
//!
//! Provides [`ScriptedBackend`], an in-memory [`EngineBackend`] whose load
//! and exec behavior is scripted per test, and [`TestHarness`] which wires
//! it into an [`EngineHandle`], [`EventBus`] and [`Orchestrator`].

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use vidshrink::{JobHandle, Orchestrator};
use vs_core::config::{Config, MIB};
use vs_core::events::{EventBus, JobEventPayload};
use vs_core::{Error, JobState};
use vs_engine::{EngineBackend, EngineHandle, EventSink};

/// Engine operation a [`ScriptedBackend`] can be told to park in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Write,
    Exec,
    Read,
}

/// What a scripted `exec` call does.
#[derive(Debug, Clone)]
pub struct ExecScript {
    /// Progress fractions emitted in order.
    pub ticks: Vec<f64>,
    /// Log lines emitted before the ticks.
    pub logs: Vec<String>,
    /// Exit status returned.
    pub status: i32,
    /// Bytes stored under the last argument when `status` is 0.
    pub output: Option<Bytes>,
}

impl Default for ExecScript {
    fn default() -> Self {
        Self {
            ticks: vec![0.0, 0.5, 1.0],
            logs: Vec::new(),
            status: 0,
            output: Some(Bytes::from_static(b"compressed")),
        }
    }
}

/// In-memory backend with scripted behavior and call recording.
#[derive(Default)]
pub struct ScriptedBackend {
    pub script: Mutex<ExecScript>,
    /// Number of load attempts still to fail with `AssetFetchFailed`.
    pub fail_loads: AtomicUsize,
    pub load_delay: Duration,
    pub block_at: Option<Stage>,
    pub panic_at: Option<Stage>,

    pub loads: AtomicUsize,
    pub writes: Mutex<Vec<(String, usize)>>,
    pub execs: Mutex<Vec<Vec<String>>>,

    /// Signalled when a blocking stage is entered.
    pub entered: Notify,
    /// Releases a blocked stage.
    pub release: Notify,

    files: Mutex<HashMap<String, Bytes>>,
    sink: Mutex<Option<EventSink>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: ExecScript) -> Self {
        Self {
            script: Mutex::new(script),
            ..Self::default()
        }
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn blocking_at(mut self, stage: Stage) -> Self {
        self.block_at = Some(stage);
        self
    }

    pub fn panicking_at(mut self, stage: Stage) -> Self {
        self.panic_at = Some(stage);
        self
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    async fn gate(&self, stage: Stage) {
        if self.panic_at == Some(stage) {
            panic!("engine crashed in {stage:?}");
        }
        if self.block_at == Some(stage) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

#[async_trait]
impl EngineBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn load(&self, events: EventSink) -> vs_core::Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        let remaining = self.fail_loads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_loads.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::asset_fetch("core", "connection reset"));
        }
        *self.sink.lock() = Some(events);
        Ok(())
    }

    async fn write_file(&self, name: &str, data: Bytes) -> vs_core::Result<()> {
        self.writes.lock().push((name.to_string(), data.len()));
        self.gate(Stage::Write).await;
        self.files.lock().insert(name.to_string(), data);
        Ok(())
    }

    async fn exec(&self, args: &[String]) -> vs_core::Result<i32> {
        self.execs.lock().push(args.to_vec());
        let script = self.script.lock().clone();
        let sink = self.sink.lock().clone();

        if let Some(sink) = sink {
            for line in &script.logs {
                sink.log(line.clone());
            }
            for tick in &script.ticks {
                sink.progress(*tick);
                tokio::task::yield_now().await;
            }
        }
        self.gate(Stage::Exec).await;

        if script.status == 0 {
            if let (Some(output), Some(name)) = (script.output, args.last()) {
                self.files.lock().insert(name.clone(), output);
            }
        }
        Ok(script.status)
    }

    async fn read_file(&self, name: &str) -> vs_core::Result<Bytes> {
        self.gate(Stage::Read).await;
        self.files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::output_missing(name))
    }
}

/// Scripted backend wired into a full orchestrator.
pub struct TestHarness {
    pub backend: Arc<ScriptedBackend>,
    pub engine: Arc<EngineHandle>,
    pub bus: Arc<EventBus>,
    pub orchestrator: Orchestrator,
}

impl TestHarness {
    /// Harness with default configuration; the engine is not loaded.
    pub fn new(backend: ScriptedBackend) -> Self {
        Self::with_config(backend, Config::default())
    }

    pub fn with_config(backend: ScriptedBackend, config: Config) -> Self {
        let backend = Arc::new(backend);
        let engine = Arc::new(EngineHandle::from_arc(
            backend.clone(),
            config.engine.event_capacity,
        ));
        let bus = Arc::new(EventBus::new(1024));
        let orchestrator = Orchestrator::new(
            engine.clone(),
            config.transcode.clone(),
            config.jobs.clone(),
            bus.clone(),
        );
        Self {
            backend,
            engine,
            bus,
            orchestrator,
        }
    }

    /// Harness with a loaded engine.
    pub async fn ready(backend: ScriptedBackend) -> Self {
        let harness = Self::new(backend);
        harness.engine.load().await.expect("scripted load failed");
        harness
    }

    pub async fn ready_with_config(backend: ScriptedBackend, config: Config) -> Self {
        let harness = Self::with_config(backend, config);
        harness.engine.load().await.expect("scripted load failed");
        harness
    }
}

/// A buffer of `n` MiB.
pub fn mib(n: u64) -> Bytes {
    Bytes::from(vec![0u8; (n * MIB) as usize])
}

/// Collect every event of a job up to and including its terminal event.
pub async fn collect_events(job: &mut JobHandle) -> Vec<JobEventPayload> {
    let mut events = Vec::new();
    let collect = async {
        while let Some(event) = job.next_event().await {
            events.push(event);
        }
    };
    tokio::time::timeout(Duration::from_secs(5), collect)
        .await
        .expect("job did not finish in time");
    events
}

/// The `to` states of every state-change event, in order.
pub fn state_path(events: &[JobEventPayload]) -> Vec<JobState> {
    events
        .iter()
        .filter_map(|e| match e {
            JobEventPayload::StateChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect()
}

/// The percents of every progress event, in order.
pub fn progress_path(events: &[JobEventPayload]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            JobEventPayload::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}

/// Wait until the job reports `state`.
pub async fn wait_for_state(job: &JobHandle, state: JobState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while job.state() != state {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("job did not reach the expected state");
}
