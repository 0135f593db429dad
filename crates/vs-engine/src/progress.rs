//! Parser for ffmpeg `-progress` output.
//!
//! ffmpeg writes `key=value` lines in blocks, each terminated by
//! `progress=continue` or, for the final block, `progress=end`. The parser
//! tracks the encoded timestamp and converts it into a fraction of the input
//! duration at the end of every block.

use std::time::Duration;

/// Incremental parser for one encode's progress stream.
#[derive(Debug, Clone, Default)]
pub struct ProgressParser {
    duration_us: Option<i64>,
    out_time_us: Option<i64>,
}

impl ProgressParser {
    /// Create a parser for an input of the given duration, if known.
    pub fn new(duration: Option<Duration>) -> Self {
        let duration_us = duration
            .map(|d| d.as_micros().min(i64::MAX as u128) as i64)
            .filter(|us| *us > 0);
        Self {
            duration_us,
            out_time_us: None,
        }
    }

    /// Feed one line. Returns the completion fraction when the line closes a
    /// block and a fraction can be computed.
    ///
    /// Without a known duration only the final block reports (as `1.0`).
    pub fn feed(&mut self, line: &str) -> Option<f64> {
        let line = line.trim();
        // ffmpeg's `out_time_ms` is also in microseconds.
        if let Some(val) = line
            .strip_prefix("out_time_us=")
            .or_else(|| line.strip_prefix("out_time_ms="))
        {
            if let Ok(us) = val.trim().parse::<i64>() {
                self.out_time_us = Some(us);
            }
        } else if let Some(val) = line.strip_prefix("out_time=") {
            if let Some(us) = parse_timestamp_us(val) {
                self.out_time_us = Some(us);
            }
        } else if let Some(val) = line.strip_prefix("progress=") {
            if val.trim() == "end" {
                return Some(1.0);
            }
            return self.fraction();
        }
        None
    }

    fn fraction(&self) -> Option<f64> {
        let (out, total) = (self.out_time_us?, self.duration_us?);
        Some((out as f64 / total as f64).clamp(0.0, 1.0))
    }
}

/// Whether `line` looks like a `key=value` progress line rather than log text.
pub fn is_progress_line(line: &str) -> bool {
    match line.split_once('=') {
        Some((key, _)) => {
            !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        }
        None => false,
    }
}

/// Parse ffprobe's `format=duration` output (seconds, e.g. `12.345000`).
pub fn parse_duration_secs(raw: &str) -> Option<Duration> {
    let secs = raw.trim().lines().next()?.trim().parse::<f64>().ok()?;
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

/// Parse `HH:MM:SS.micro` into microseconds.
fn parse_timestamp_us(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (negative, raw) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let mut parts = raw.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let whole = hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_mul(1_000_000)?;
    let frac = seconds * 1_000_000.0;
    if !frac.is_finite() || frac.abs() >= i64::MAX as f64 {
        return None;
    }
    let us = whole.checked_add(frac.round() as i64)?;
    Some(if negative { -us } else { us })
}
