//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! engine, transcode and job sub-configs. Every section defaults sensibly so
//! a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Presets accepted by x264/x265-style encoders.
const KNOWN_PRESETS: &[&str] = &[
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
    "placebo",
];

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub transcode: TranscodeConfig,
    pub jobs: JobConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let t = &self.transcode;
        if t.video_codec.trim().is_empty() {
            warnings.push("transcode.video_codec is empty".into());
        }
        if t.crf > 51 {
            warnings.push(format!(
                "transcode.crf {} is outside the 0-51 range most encoders accept",
                t.crf
            ));
        }
        if !KNOWN_PRESETS.contains(&t.preset.as_str()) {
            warnings.push(format!(
                "transcode.preset '{}' is not a recognized preset (valid: {})",
                t.preset,
                KNOWN_PRESETS.join(", ")
            ));
        }
        if t.threads == 0 {
            warnings.push("transcode.threads is 0; the engine will pick a thread count".into());
        }
        if t.input_name == t.output_name {
            warnings.push(format!(
                "transcode.input_name and transcode.output_name are both '{}'",
                t.input_name
            ));
        }
        if !t.progress {
            warnings.push("transcode.progress is disabled; jobs will not report progress".into());
        }

        if self.jobs.max_input_bytes == 0 {
            warnings.push("jobs.max_input_bytes is 0; every submission will be rejected".into());
        }
        if self.jobs.max_log_lines == 0 {
            warnings.push("jobs.max_log_lines is 0; job logs will not be retained".into());
        }

        if self.engine.event_capacity == 0 {
            warnings.push("engine.event_capacity is 0; 1 will be used".into());
        }
        if let Some(ref p) = self.engine.ffmpeg_path {
            if !p.exists() {
                warnings.push(format!(
                    "engine.ffmpeg_path {} does not exist; PATH will be searched",
                    p.display()
                ));
            }
        }
        if let Some(ref p) = self.engine.ffprobe_path {
            if !p.exists() {
                warnings.push(format!(
                    "engine.ffprobe_path {} does not exist; PATH will be searched",
                    p.display()
                ));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Engine bootstrap and runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Override for the ffmpeg binary; `PATH` is searched otherwise.
    pub ffmpeg_path: Option<PathBuf>,
    /// Override for the ffprobe binary; `PATH` is searched otherwise.
    pub ffprobe_path: Option<PathBuf>,
    /// Parent directory for the engine's temporary working storage.
    pub work_dir: Option<PathBuf>,
    #[serde(default = "default_exec_timeout")]
    pub exec_timeout_secs: u64,
    /// Buffer size of the engine event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_exec_timeout() -> u64 {
    86_400
}
fn default_event_capacity() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            work_dir: None,
            exec_timeout_secs: default_exec_timeout(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Fixed transcode parameters applied to every job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    /// Container codec tag (e.g. `avc1` so players recognise H.264 in MP4).
    pub codec_tag: Option<String>,
    #[serde(default = "default_preset")]
    pub preset: String,
    /// Constant rate factor; lower means higher quality and larger output.
    #[serde(default = "default_crf")]
    pub crf: u32,
    /// Move the index to the front of the container for progressive playback.
    #[serde(default = "default_true")]
    pub faststart: bool,
    #[serde(default = "default_threads")]
    pub threads: u32,
    /// Engine diagnostic verbosity.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub progress: bool,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    #[serde(default = "default_output_name")]
    pub output_name: String,
}

fn default_video_codec() -> String {
    "libx264".into()
}
fn default_preset() -> String {
    "superfast".into()
}
fn default_crf() -> u32 {
    30
}
fn default_threads() -> u32 {
    4
}
fn default_log_level() -> String {
    "error".into()
}
fn default_input_name() -> String {
    "input.mp4".into()
}
fn default_output_name() -> String {
    "output.mp4".into()
}
fn default_true() -> bool {
    true
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            video_codec: default_video_codec(),
            codec_tag: Some("avc1".into()),
            preset: default_preset(),
            crf: default_crf(),
            faststart: true,
            threads: default_threads(),
            log_level: default_log_level(),
            progress: true,
            input_name: default_input_name(),
            output_name: default_output_name(),
        }
    }
}

/// Per-job limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: u64,
    /// Newest log lines retained per job; older lines are dropped.
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,
}

fn default_max_input_bytes() -> u64 {
    1000 * MIB
}
fn default_max_log_lines() -> usize {
    10_000
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: default_max_input_bytes(),
            max_log_lines: default_max_log_lines(),
        }
    }
}
