//! Mutable job record owned by the runner task.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use vs_core::{Error, JobFailure, JobId, JobState, Result};

use super::result::ResultProjection;

/// How a job ended.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed(Arc<ResultProjection>),
    Failed(JobFailure),
    Cancelled,
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Completed(_) => JobState::Completed,
            JobOutcome::Failed(_) => JobState::Failed,
            JobOutcome::Cancelled => JobState::Cancelled,
        }
    }
}

/// Point-in-time copy of a job for observers.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub id: JobId,
    pub state: JobState,
    pub progress_percent: u8,
    pub input_size_bytes: u64,
    /// Retained log lines, oldest first.
    pub log_lines: Vec<String>,
    /// Lines discarded to respect the retention cap.
    pub dropped_log_lines: u64,
    pub failure: Option<JobFailure>,
    pub result: Option<Arc<ResultProjection>>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub(crate) struct Job {
    id: JobId,
    state: JobState,
    progress_percent: u8,
    input_size_bytes: u64,
    log_lines: VecDeque<String>,
    max_log_lines: usize,
    dropped_log_lines: u64,
    outcome: Option<JobOutcome>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub(crate) fn new(id: JobId, input_size_bytes: u64, max_log_lines: usize) -> Self {
        Self {
            id,
            state: JobState::Created,
            progress_percent: 0,
            input_size_bytes,
            log_lines: VecDeque::new(),
            max_log_lines,
            dropped_log_lines: 0,
            outcome: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn outcome(&self) -> Option<JobOutcome> {
        self.outcome.clone()
    }

    /// Move to the next non-terminal stage. Returns the previous state.
    pub(crate) fn advance(&mut self, to: JobState) -> Result<JobState> {
        if to.is_terminal() {
            return Err(Error::Internal(format!(
                "job {} must finish with an outcome to enter {to}",
                self.id
            )));
        }
        self.transition(to)
    }

    /// Enter the terminal state matching `outcome`. Returns the previous state.
    pub(crate) fn finish(&mut self, outcome: JobOutcome) -> Result<JobState> {
        let from = self.transition(outcome.state())?;
        self.outcome = Some(outcome);
        self.finished_at = Some(Utc::now());
        Ok(from)
    }

    fn transition(&mut self, to: JobState) -> Result<JobState> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(Error::Internal(format!(
                "job {} cannot move from {from} to {to}",
                self.id
            )));
        }
        self.state = to;
        Ok(from)
    }

    /// Apply a progress tick. Only counted while encoding; the percent never
    /// decreases. Returns the percent to report.
    pub(crate) fn record_progress(&mut self, fraction: f64) -> Option<u8> {
        if self.state != JobState::Encoding || !fraction.is_finite() {
            return None;
        }
        let percent = (fraction * 100.0).round().clamp(0.0, 100.0) as u8;
        self.progress_percent = self.progress_percent.max(percent);
        Some(self.progress_percent)
    }

    /// Append a log line, dropping the oldest once the cap is reached.
    pub(crate) fn push_log(&mut self, line: String) {
        if self.max_log_lines == 0 {
            self.dropped_log_lines += 1;
            return;
        }
        if self.log_lines.len() == self.max_log_lines {
            self.log_lines.pop_front();
            self.dropped_log_lines += 1;
        }
        self.log_lines.push_back(line);
    }

    pub(crate) fn log_lines(&self) -> Vec<String> {
        self.log_lines.iter().cloned().collect()
    }

    pub(crate) fn snapshot(&self) -> JobSnapshot {
        let (failure, result) = match &self.outcome {
            Some(JobOutcome::Failed(f)) => (Some(f.clone()), None),
            Some(JobOutcome::Completed(r)) => (None, Some(r.clone())),
            Some(JobOutcome::Cancelled) | None => (None, None),
        };
        JobSnapshot {
            id: self.id,
            state: self.state,
            progress_percent: self.progress_percent,
            input_size_bytes: self.input_size_bytes,
            log_lines: self.log_lines(),
            dropped_log_lines: self.dropped_log_lines,
            failure,
            result,
            created_at: self.created_at,
            finished_at: self.finished_at,
        }
    }
}
