//! Worker state, job status events and the current-job marker.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::worker::job::JobId;

/// State of a job as reported to the event sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Queued by the pool, not yet picked up.
    Waiting,
    /// A worker is executing the job.
    Running,
    Done,
    Failed,
    Canceled,
}

impl JobState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

/// Event sent to the outbound sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    JobState { job_id: JobId, state: JobState },
}

impl JobEvent {
    pub fn running(job_id: JobId) -> Self {
        Self::JobState {
            job_id,
            state: JobState::Running,
        }
    }
}

/// Whether a worker is executing a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
}

/// Shared view of the job a worker is currently executing.
///
/// Only the owning worker sets it; clones are read-only observers.
#[derive(Debug, Clone, Default)]
pub struct CurrentJob(Arc<Mutex<Option<JobId>>>);

impl CurrentJob {
    fn slot(&self) -> MutexGuard<'_, Option<JobId>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> Option<JobId> {
        self.slot().clone()
    }

    pub fn state(&self) -> WorkerState {
        if self.slot().is_some() {
            WorkerState::Running
        } else {
            WorkerState::Idle
        }
    }

    /// Mark `job_id` as current until the returned guard is dropped.
    pub(crate) fn enter(&self, job_id: JobId) -> CurrentJobGuard {
        *self.slot() = Some(job_id);
        CurrentJobGuard {
            marker: self.clone(),
        }
    }
}

/// Clears the marker on drop, whichever way the job ended.
#[must_use]
pub(crate) struct CurrentJobGuard {
    marker: CurrentJob,
}

impl Drop for CurrentJobGuard {
    fn drop(&mut self) {
        *self.marker.slot() = None;
    }
}
