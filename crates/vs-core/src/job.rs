//! Job lifecycle states and failure records.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, ErrorKind};

/// Lifecycle state of a compression job.
///
/// Transitions only move forward through
/// `Created → WritingInput → Encoding → ReadingOutput → Completed`; any
/// non-terminal state may also end in `Failed` or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    WritingInput,
    Encoding,
    ReadingOutput,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// Whether the job has finished (successfully or not).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// Whether the job currently occupies the engine.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// The state reached when the current stage succeeds.
    pub fn next(self) -> Option<JobState> {
        match self {
            JobState::Created => Some(JobState::WritingInput),
            JobState::WritingInput => Some(JobState::Encoding),
            JobState::Encoding => Some(JobState::ReadingOutput),
            JobState::ReadingOutput => Some(JobState::Completed),
            JobState::Completed | JobState::Failed | JobState::Cancelled => None,
        }
    }

    /// Whether moving from `self` to `to` is a legal transition.
    pub fn can_transition_to(self, to: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(to, JobState::Failed | JobState::Cancelled) || self.next() == Some(to)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Created => "created",
            JobState::WritingInput => "writing_input",
            JobState::Encoding => "encoding",
            JobState::ReadingOutput => "reading_output",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Inspectable record of why a job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Log lines attached to the error itself (for encode failures, the lines
    /// captured during the failed engine run).
    pub error_log_lines: Vec<String>,
    /// Every log line the job accumulated up to the failure.
    pub job_log_lines: Vec<String>,
}

impl JobFailure {
    /// Build a failure record from an error and the job's accumulated logs.
    pub fn from_error(err: &Error, job_log_lines: Vec<String>) -> Self {
        let message = match err {
            Error::EncodeFailed { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            kind: err.kind(),
            message,
            error_log_lines: err.log_lines().to_vec(),
            job_log_lines,
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
