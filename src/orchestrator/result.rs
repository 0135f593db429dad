//! Compression statistics for a completed job.

use std::fmt;

use bytes::Bytes;
use vs_core::config::MIB;

/// Size reduction of the output relative to the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompressionRatio {
    /// `((original - compressed) / original) * 100`. Negative when the
    /// output grew.
    Percent(f64),
    /// The original was empty, so no ratio exists.
    NotComputable,
}

impl CompressionRatio {
    /// Compute the ratio for a pair of sizes.
    pub fn compute(original_size_bytes: u64, compressed_size_bytes: u64) -> Self {
        if original_size_bytes == 0 {
            return CompressionRatio::NotComputable;
        }
        let original = original_size_bytes as f64;
        let saved = original - compressed_size_bytes as f64;
        CompressionRatio::Percent(saved * 100.0 / original)
    }

    /// The percentage, if one exists.
    pub fn percent(self) -> Option<f64> {
        match self {
            CompressionRatio::Percent(p) => Some(p),
            CompressionRatio::NotComputable => None,
        }
    }
}

impl fmt::Display for CompressionRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionRatio::Percent(p) => write!(f, "{p:.2}%"),
            CompressionRatio::NotComputable => f.write_str("not computable"),
        }
    }
}

/// Immutable summary of a completed job: sizes, ratio and the output bytes.
///
/// Built exactly once when the job completes and shared behind an `Arc`
/// afterwards.
#[derive(Debug, Clone)]
pub struct ResultProjection {
    original_size_bytes: u64,
    compressed_size_bytes: u64,
    ratio: CompressionRatio,
    output: Bytes,
}

impl ResultProjection {
    pub fn new(original_size_bytes: u64, output: Bytes) -> Self {
        let compressed_size_bytes = output.len() as u64;
        Self {
            original_size_bytes,
            compressed_size_bytes,
            ratio: CompressionRatio::compute(original_size_bytes, compressed_size_bytes),
            output,
        }
    }

    pub fn original_size_bytes(&self) -> u64 {
        self.original_size_bytes
    }

    pub fn compressed_size_bytes(&self) -> u64 {
        self.compressed_size_bytes
    }

    pub fn compression_ratio(&self) -> CompressionRatio {
        self.ratio
    }

    /// The re-encoded video. Cloning is cheap.
    pub fn output(&self) -> &Bytes {
        &self.output
    }

    pub fn original_mib(&self) -> f64 {
        self.original_size_bytes as f64 / MIB as f64
    }

    pub fn compressed_mib(&self) -> f64 {
        self.compressed_size_bytes as f64 / MIB as f64
    }
}

impl fmt::Display for ResultProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "original {:.2} MiB, compressed {:.2} MiB, reduction {}",
            self.original_mib(),
            self.compressed_mib(),
            self.ratio
        )
    }
}
