//! Engine asset discovery.
//!
//! The ffmpeg backend needs two binaries: `ffmpeg` (the encoder core) and
//! `ffprobe` (used to learn the input duration for progress). Each is taken
//! from the configured override when that path exists, otherwise located on
//! `PATH`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use vs_core::config::EngineConfig;
use vs_core::{Error, Result};

/// Name of the encoder core binary.
pub const FFMPEG: &str = "ffmpeg";
/// Name of the probe binary.
pub const FFPROBE: &str = "ffprobe";

/// Resolved paths to the engine's binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineAssets {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl EngineAssets {
    /// Locate both binaries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssetFetchFailed`] naming the first binary that could
    /// not be found.
    pub fn resolve(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            ffmpeg: resolve_tool(FFMPEG, config.ffmpeg_path.as_deref())?,
            ffprobe: resolve_tool(FFPROBE, config.ffprobe_path.as_deref())?,
        })
    }
}

/// Locate a single binary, preferring an existing override.
pub fn resolve_tool(name: &str, custom: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = custom {
        if p.exists() {
            return Ok(p.to_path_buf());
        }
        tracing::warn!(
            "Configured {name} path {} does not exist; searching PATH",
            p.display()
        );
    }
    which::which(name)
        .map_err(|e| Error::asset_fetch(name, format!("{name} not found; is it installed and in PATH? ({e})")))
}

/// Run a short-lived helper invocation and capture its output.
///
/// Unlike the transcode itself, a non-zero exit is not an error here; callers
/// inspect `status` themselves.
pub(crate) async fn run_tool(
    program: &Path,
    args: &[&str],
    dir: Option<&Path>,
    timeout: Duration,
) -> std::io::Result<std::process::Output> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }

    let child = cmd.spawn()?;
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result,
        Err(_elapsed) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("{} timed out after {timeout:?}", program.display()),
        )),
    }
}
