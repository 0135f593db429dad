use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vidshrink")]
#[command(author, version, about = "Re-encode a video into a smaller file")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compress a video file
    Compress {
        /// Video file to compress
        #[arg(required = true)]
        input: PathBuf,

        /// Where to write the result (default: compressed_<name>.mp4 next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load the encoding engine and report whether it is usable
    CheckEngine,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,

        /// Print the effective configuration as JSON
        #[arg(long)]
        json: bool,
    },

    /// Display version information
    Version,
}
