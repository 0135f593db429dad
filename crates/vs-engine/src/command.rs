//! Builder for the engine's transcode command line.

use vs_core::config::TranscodeConfig;

/// Where ffmpeg writes `-progress` key/value blocks.
pub const PROGRESS_TARGET: &str = "pipe:1";

/// An engine argument list.
///
/// # Example
///
/// ```
/// use vs_engine::TranscodeCommand;
///
/// let mut cmd = TranscodeCommand::new();
/// cmd.args(["-i", "input.mp4"]).arg("-y").arg("output.mp4");
/// assert_eq!(cmd.as_args().len(), 4);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscodeCommand {
    args: Vec<String>,
}

impl TranscodeCommand {
    /// Create an empty command.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the fixed compression command for `config`.
    ///
    /// Re-encodes the staged input with the configured codec and CRF/preset
    /// tradeoff, lays the container out for fast start, and asks the engine
    /// for progress blocks with quiet diagnostics.
    pub fn compress(config: &TranscodeConfig) -> Self {
        let mut cmd = Self::new();
        cmd.args(["-i", config.input_name.as_str()]);
        cmd.args(["-c:v", config.video_codec.as_str()]);
        if let Some(ref tag) = config.codec_tag {
            cmd.args(["-tag:v", tag.as_str()]);
        }
        if config.faststart {
            cmd.args(["-movflags", "+faststart"]);
        }
        cmd.args(["-crf", &config.crf.to_string()]);
        cmd.args(["-preset", config.preset.as_str()]);
        cmd.args(["-threads", &config.threads.to_string()]);
        if config.progress {
            cmd.args(["-progress", PROGRESS_TARGET, "-nostats"]);
        }
        cmd.args(["-hide_banner", "-loglevel", config.log_level.as_str()]);
        cmd.arg("-y");
        cmd.arg(config.output_name.as_str());
        cmd
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// The argument list.
    pub fn as_args(&self) -> &[String] {
        &self.args
    }

    /// Consume the builder, returning the argument list.
    pub fn into_args(self) -> Vec<String> {
        self.args
    }

    /// The value following the first `-i` flag.
    pub fn input_name(&self) -> Option<&str> {
        input_name(&self.args)
    }
}

/// The value following the first `-i` flag of an argument list.
pub fn input_name(args: &[String]) -> Option<&str> {
    args.iter()
        .position(|a| a == "-i")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// The trailing output name of an argument list, if it has one.
pub fn output_name(args: &[String]) -> Option<&str> {
    let last = args.last()?.as_str();
    if last.starts_with('-') || input_name(args) == Some(last) {
        return None;
    }
    Some(last)
}
