mod cli;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use cli::{Cli, Commands};
use vidshrink::{JobOutcome, Orchestrator};
use vs_core::config::Config;
use vs_core::events::{EventBus, JobEventPayload};
use vs_engine::{EngineAssets, EngineHandle, FfmpegBackend};

fn build_engine(config: &Config) -> EngineHandle {
    let backend = FfmpegBackend::new(config.engine.clone(), config.transcode.video_codec.clone());
    EngineHandle::new(backend, config.engine.event_capacity)
}

/// `compressed_<stem>.mp4` next to the input.
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("video");
    input.with_file_name(format!("compressed_{stem}.mp4"))
}

async fn compress(input: &Path, output: Option<&Path>, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    for warning in config.validate() {
        tracing::warn!("Config: {warning}");
    }

    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }
    let size = tokio::fs::metadata(input).await?.len();
    if size > config.jobs.max_input_bytes {
        return Err(vs_core::Error::InputTooLarge {
            size,
            max: config.jobs.max_input_bytes,
        }
        .into());
    }
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(input));

    let engine = Arc::new(build_engine(&config));
    engine.load().await.context("Failed to load the encoding engine")?;

    let bus = Arc::new(EventBus::new(config.engine.event_capacity));
    let orchestrator = Orchestrator::new(
        engine,
        config.transcode.clone(),
        config.jobs.clone(),
        bus,
    );

    let data = Bytes::from(
        tokio::fs::read(input)
            .await
            .with_context(|| format!("Failed to read {:?}", input))?,
    );
    let mut job = orchestrator.submit(data)?;
    println!(
        "Compressing {} ({:.2} MiB)",
        input.display(),
        size as f64 / vs_core::config::MIB as f64
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancelling = false;
    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !cancelling => {
                cancelling = true;
                eprintln!("\nCancelling...");
                job.cancel();
            }
            event = job.next_event() => match event {
                Some(JobEventPayload::Progress { percent, .. }) => {
                    print!("\rProgress: {percent:>3}%");
                    let _ = std::io::stdout().flush();
                }
                Some(_) => {}
                None => break,
            },
        }
    }
    println!();

    match job.wait().await {
        JobOutcome::Completed(result) => {
            tokio::fs::write(&output, result.output())
                .await
                .with_context(|| format!("Failed to write {:?}", output))?;
            println!("✓ {result}");
            println!("Output: {}", output.display());
            Ok(())
        }
        JobOutcome::Failed(failure) => {
            for line in &failure.error_log_lines {
                eprintln!("  {line}");
            }
            anyhow::bail!("Compression failed: {failure}")
        }
        JobOutcome::Cancelled => anyhow::bail!("Compression cancelled"),
    }
}

async fn check_engine(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    println!("Checking encoding engine...\n");

    match EngineAssets::resolve(&config.engine) {
        Ok(assets) => {
            println!("✓ ffmpeg - {}", assets.ffmpeg.display());
            println!("✓ ffprobe - {}", assets.ffprobe.display());
        }
        Err(e) => {
            println!("✗ {e}");
            anyhow::bail!("Engine assets are missing");
        }
    }

    let engine = build_engine(&config);
    match engine.load().await {
        Ok(()) => {
            println!(
                "✓ Engine ready (encoder {})",
                config.transcode.video_codec
            );
            Ok(())
        }
        Err(e) => {
            println!("✗ {e}");
            anyhow::bail!("Engine failed to load")
        }
    }
}

fn validate_config(path: Option<&Path>, json: bool) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read config file {:?}", p))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        let t = &config.transcode;
        println!(
            "  Encoder: {} (preset {}, crf {}, {} threads)",
            t.video_codec, t.preset, t.crf, t.threads
        );
        println!(
            "  Max input: {:.0} MiB",
            config.jobs.max_input_bytes as f64 / vs_core::config::MIB as f64
        );
        println!("  Max log lines: {}", config.jobs.max_log_lines);
    }

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &warnings {
            println!("  - {warning}");
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vidshrink=trace,vs_engine=trace,vs_core=debug".to_string()
        } else {
            "vidshrink=info,vs_engine=info,vs_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Compress { input, output } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(compress(&input, output.as_deref(), cli.config.as_deref()))
        }
        Commands::CheckEngine => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_engine(cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
            json,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref(), json)
        }
        Commands::Version => {
            println!("vidshrink {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
