//! Engine backend driving the system `ffmpeg` binary.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use vs_core::config::EngineConfig;
use vs_core::{Error, Result};

use crate::backend::{EngineBackend, EventSink};
use crate::command::{input_name, output_name};
use crate::progress::{is_progress_line, parse_duration_secs, ProgressParser};
use crate::tools::{run_tool, EngineAssets};
use crate::workspace::Workspace;

/// Timeout for the short helper invocations (encoder listing, probing).
const HELPER_TIMEOUT: Duration = Duration::from_secs(30);

struct LoadedEngine {
    assets: EngineAssets,
    workspace: Workspace,
    events: EventSink,
}

/// [`EngineBackend`] backed by `ffmpeg`/`ffprobe` processes.
///
/// Loading resolves both binaries, checks that `ffmpeg` offers the required
/// encoder, and creates the working storage. Each `exec` spawns one `ffmpeg`
/// process inside that storage; dropping the `exec` future kills it.
pub struct FfmpegBackend {
    config: EngineConfig,
    encoder: String,
    loaded: RwLock<Option<Arc<LoadedEngine>>>,
}

impl FfmpegBackend {
    /// Create an unloaded backend that requires `encoder` (e.g. `libx264`).
    pub fn new(config: EngineConfig, encoder: impl Into<String>) -> Self {
        Self {
            config,
            encoder: encoder.into(),
            loaded: RwLock::new(None),
        }
    }

    fn engine(&self) -> Result<Arc<LoadedEngine>> {
        self.loaded.read().clone().ok_or(Error::EngineNotReady)
    }

    fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.config.exec_timeout_secs.max(1))
    }

    async fn verify_encoder(&self, ffmpeg: &Path) -> Result<()> {
        let output = run_tool(ffmpeg, &["-hide_banner", "-encoders"], None, HELPER_TIMEOUT)
            .await
            .map_err(|e| Error::engine_init(format!("failed to run {}: {e}", ffmpeg.display())))?;

        if !output.status.success() {
            return Err(Error::engine_init(format!(
                "{} -encoders exited with status {}: {}",
                ffmpeg.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        if !lists_encoder(&listing, &self.encoder) {
            return Err(Error::engine_init(format!(
                "encoder {} is not available in {}",
                self.encoder,
                ffmpeg.display()
            )));
        }
        Ok(())
    }
}

/// Whether an `ffmpeg -encoders` listing contains `encoder`.
///
/// Listing rows look like ` V....D libx264    libx264 H.264 / AVC ...`.
fn lists_encoder(listing: &str, encoder: &str) -> bool {
    listing
        .lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let flags = cols.next()?;
            let name = cols.next()?;
            (flags.len() == 6).then_some(name)
        })
        .any(|name| name == encoder)
}

/// Ask ffprobe for the container duration of a staged file.
async fn probe_duration(ffprobe: &Path, dir: &Path, name: &str) -> Option<Duration> {
    let args = [
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
        name,
    ];
    match run_tool(ffprobe, &args, Some(dir), HELPER_TIMEOUT).await {
        Ok(output) if output.status.success() => {
            parse_duration_secs(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            tracing::warn!(
                "ffprobe could not read the duration of {name}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            None
        }
        Err(e) => {
            tracing::warn!("ffprobe failed for {name}: {e}");
            None
        }
    }
}

#[async_trait]
impl EngineBackend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn load(&self, events: EventSink) -> Result<()> {
        let assets = EngineAssets::resolve(&self.config)?;
        tracing::debug!(ffmpeg = %assets.ffmpeg.display(), ffprobe = %assets.ffprobe.display(), "Resolved engine assets");

        self.verify_encoder(&assets.ffmpeg).await?;
        let workspace = Workspace::new(self.config.work_dir.as_deref())?;
        tracing::debug!(dir = %workspace.dir().display(), "Created engine working storage");

        *self.loaded.write() = Some(Arc::new(LoadedEngine {
            assets,
            workspace,
            events,
        }));
        Ok(())
    }

    async fn write_file(&self, name: &str, data: Bytes) -> Result<()> {
        self.engine()?.workspace.write(name, &data).await
    }

    async fn exec(&self, args: &[String]) -> Result<i32> {
        let engine = self.engine()?;
        let dir = engine.workspace.dir();

        let duration = match input_name(args) {
            Some(name) => probe_duration(&engine.assets.ffprobe, dir, name).await,
            None => None,
        };
        let mut parser = ProgressParser::new(duration);

        // A leftover artifact from an earlier run must not stand in for this one.
        if let Some(name) = output_name(args) {
            if engine.workspace.path_for(name).is_ok() {
                engine.workspace.remove(name).await?;
            }
        }

        let mut child = Command::new(&engine.assets.ffmpeg)
            .args(args)
            .current_dir(dir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::encode_failed(
                    format!("failed to spawn {}: {e}", engine.assets.ffmpeg.display()),
                    Vec::new(),
                )
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("ffmpeg stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("ffmpeg stderr was not captured".into()))?;
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let events = &engine.events;

        let run = async {
            let (mut out_done, mut err_done) = (false, false);
            while !(out_done && err_done) {
                tokio::select! {
                    line = out_lines.next_line(), if !out_done => match line {
                        Ok(Some(line)) if is_progress_line(&line) => {
                            if let Some(fraction) = parser.feed(&line) {
                                events.progress(fraction);
                            }
                        }
                        Ok(Some(line)) if !line.trim().is_empty() => events.log(line.trim_end()),
                        Ok(Some(_)) => {}
                        Ok(None) | Err(_) => out_done = true,
                    },
                    line = err_lines.next_line(), if !err_done => match line {
                        Ok(Some(line)) if !line.trim().is_empty() => events.log(line.trim_end()),
                        Ok(Some(_)) => {}
                        Ok(None) | Err(_) => err_done = true,
                    },
                }
            }
            child.wait().await
        };

        let timeout = self.exec_timeout();
        let status = tokio::time::timeout(timeout, run)
            .await
            .map_err(|_| Error::encode_failed(format!("ffmpeg timed out after {timeout:?}"), Vec::new()))??;

        // Killed by a signal: no exit code.
        Ok(status.code().unwrap_or(-1))
    }

    async fn read_file(&self, name: &str) -> Result<Bytes> {
        self.engine()?.workspace.read(name).await
    }
}
