//! Event types for the run log.
//!
//! Every stage transition is recorded as an immutable event in an
//! append-only log, so a finished run can be reconstructed later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single event in the append-only run log.
///
/// Events are the source of truth for recorded runs. The state of any
/// finished run can be reconstructed by replaying its events in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Stage name (absent for run-level events)
    pub stage: Option<String>,

    /// Type of event
    pub kind: EventKind,

    /// Human-readable summary (NO secrets)
    pub detail: String,

    /// Time taken in milliseconds (for finished stages)
    pub duration_ms: Option<u64>,

    /// Failure reason if the stage failed
    pub reason: Option<String>,
}

impl RunEvent {
    /// Create a new event with the current timestamp
    pub fn new(run_id: Uuid, stage: Option<String>, kind: EventKind, detail: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            stage,
            kind,
            detail,
            duration_ms: None,
            reason: None,
        }
    }

    /// Attach duration information
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attach a failure reason
    pub fn with_reason(mut self, reason: String) -> Self {
        self.reason = Some(reason);
        self
    }
}

/// Types of events recorded during a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new run has started
    RunStarted,

    /// A run finished with every required stage passed
    RunPassed,

    /// A run finished with a required stage failed or skipped
    RunFailed,

    /// A stage has started execution
    StageStarted,

    /// A stage finished successfully
    StagePassed,

    /// A stage failed
    StageFailed,

    /// A stage was skipped because an upstream required stage failed
    StageSkipped,
}

/// Status of a stage within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not yet started
    Pending,

    /// Currently executing
    Running,

    /// Finished successfully
    Passed,

    /// Finished with a failure
    Failed,

    /// Never started because an upstream required stage failed
    Skipped,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}
