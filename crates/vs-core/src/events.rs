//! Job event system.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that late-joining observers can catch up.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::ids::JobId;
use crate::job::JobState;

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 100;

// ---------------------------------------------------------------------------
// JobEventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEventPayload {
    StateChanged {
        job_id: JobId,
        from: JobState,
        to: JobState,
    },
    Progress {
        job_id: JobId,
        percent: u8,
    },
    Log {
        job_id: JobId,
        line: String,
    },
    Completed {
        job_id: JobId,
        original_size_bytes: u64,
        compressed_size_bytes: u64,
        /// `None` when the original size is zero and no ratio exists.
        compression_ratio_percent: Option<f64>,
    },
    Failed {
        job_id: JobId,
        kind: ErrorKind,
        message: String,
    },
    Cancelled {
        job_id: JobId,
    },
}

impl JobEventPayload {
    /// The job this payload belongs to.
    pub fn job_id(&self) -> JobId {
        match self {
            JobEventPayload::StateChanged { job_id, .. }
            | JobEventPayload::Progress { job_id, .. }
            | JobEventPayload::Log { job_id, .. }
            | JobEventPayload::Completed { job_id, .. }
            | JobEventPayload::Failed { job_id, .. }
            | JobEventPayload::Cancelled { job_id } => *job_id,
        }
    }

    /// Whether this payload announces the end of a job.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEventPayload::Completed { .. }
                | JobEventPayload::Failed { .. }
                | JobEventPayload::Cancelled { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub payload: JobEventPayload,
}

impl JobEvent {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(payload: JobEventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
    recent: RwLock<VecDeque<JobEvent>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    /// Subscribe to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers and store it in the
    /// ring buffer.
    pub fn broadcast(&self, payload: JobEventPayload) {
        let event = JobEvent::new(payload);

        // Store in ring buffer regardless of subscriber count.
        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // Ignore send errors (no subscribers).
        let _ = self.tx.send(event);
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<JobEvent> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
