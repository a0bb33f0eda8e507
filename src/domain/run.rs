//! Run state and reconstruction from the run log.
//!
//! A PipelineRun represents a single gated execution of a pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{EventKind, RunEvent, StageStatus};

/// A single pipeline execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Name of the pipeline being executed
    pub pipeline_name: String,

    /// The event that triggered this run
    pub trigger: TriggerContext,

    /// Per-stage status records, in declared stage order
    pub records: Vec<StageRecord>,

    /// Terminal status of the whole run
    pub overall: OverallStatus,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run completed (if finished)
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Create a new in-progress run
    pub fn new(id: Uuid, pipeline_name: String, trigger: TriggerContext) -> Self {
        Self {
            id,
            pipeline_name,
            trigger,
            records: Vec::new(),
            overall: OverallStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// The persisted header for this run
    pub fn header(&self) -> RunHeader {
        RunHeader {
            id: self.id,
            pipeline_name: self.pipeline_name.clone(),
            trigger: self.trigger.clone(),
            started_at: self.started_at,
        }
    }

    /// Reconstruct a run from its persisted header and event log
    pub fn from_log(header: RunHeader, events: &[RunEvent]) -> Self {
        let mut run = Self {
            id: header.id,
            pipeline_name: header.pipeline_name,
            trigger: header.trigger,
            records: Vec::new(),
            overall: OverallStatus::Running,
            started_at: header.started_at,
            completed_at: None,
        };

        for event in events {
            run.apply_event(event);
        }

        run
    }

    /// Apply a single event to update run state
    pub fn apply_event(&mut self, event: &RunEvent) {
        match event.kind {
            EventKind::RunStarted => {
                self.started_at = event.timestamp;
            }
            EventKind::RunPassed => {
                self.overall = OverallStatus::Passed;
                self.completed_at = Some(event.timestamp);
            }
            EventKind::RunFailed => {
                self.overall = OverallStatus::Failed;
                self.completed_at = Some(event.timestamp);
            }
            EventKind::StageStarted => {
                if let Some(ref stage) = event.stage {
                    self.upsert(stage, StageStatus::Running, None, None);
                }
            }
            EventKind::StagePassed => {
                if let Some(ref stage) = event.stage {
                    self.upsert(stage, StageStatus::Passed, event.duration_ms, None);
                }
            }
            EventKind::StageFailed => {
                if let Some(ref stage) = event.stage {
                    self.upsert(stage, StageStatus::Failed, event.duration_ms, event.reason.clone());
                }
            }
            EventKind::StageSkipped => {
                if let Some(ref stage) = event.stage {
                    self.upsert(stage, StageStatus::Skipped, None, event.reason.clone());
                }
            }
        }
    }

    fn upsert(
        &mut self,
        stage: &str,
        status: StageStatus,
        duration_ms: Option<u64>,
        reason: Option<String>,
    ) {
        if let Some(record) = self.records.iter_mut().find(|r| r.name == stage) {
            record.status = status;
            record.duration_ms = duration_ms;
            record.reason = reason;
        } else {
            self.records.push(StageRecord {
                name: stage.to_string(),
                status,
                duration_ms,
                reason,
            });
        }
    }

    /// Record a stage outcome directly (used by the live runner)
    pub fn record(&mut self, record: StageRecord) {
        let StageRecord {
            name,
            status,
            duration_ms,
            reason,
        } = record;
        self.upsert(&name, status, duration_ms, reason);
    }

    /// Check if the run has reached a terminal status
    pub fn is_finished(&self) -> bool {
        !matches!(self.overall, OverallStatus::Running)
    }

    /// Check if every required stage passed
    pub fn is_passed(&self) -> bool {
        matches!(self.overall, OverallStatus::Passed)
    }

    /// Status of a stage by name
    pub fn stage_status(&self, name: &str) -> Option<StageStatus> {
        self.records.iter().find(|r| r.name == name).map(|r| r.status)
    }

    /// The first failed stage record, if any
    pub fn first_failure(&self) -> Option<&StageRecord> {
        self.records
            .iter()
            .find(|r| r.status == StageStatus::Failed)
    }
}

/// Persisted run metadata, written once at trigger time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunHeader {
    pub id: Uuid,
    pub pipeline_name: String,
    pub trigger: TriggerContext,
    pub started_at: DateTime<Utc>,
}

/// Terminal status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// Currently executing
    Running,

    /// Every required stage passed
    Passed,

    /// A required stage failed or was skipped
    Failed,
}

/// Structured per-stage status record (name, status, duration)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
    pub duration_ms: Option<u64>,
    pub reason: Option<String>,
}

impl StageRecord {
    pub fn passed(name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Passed,
            duration_ms: Some(duration_ms),
            reason: None,
        }
    }

    pub fn failed(name: impl Into<String>, duration_ms: u64, reason: String) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Failed,
            duration_ms: Some(duration_ms),
            reason: Some(reason),
        }
    }

    pub fn skipped(name: impl Into<String>, reason: String) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Skipped,
            duration_ms: None,
            reason: Some(reason),
        }
    }
}

/// The event that triggered a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerContext {
    /// Kind of repository event
    pub event: TriggerEvent,

    /// Branch the event targets
    pub branch: String,

    /// Commit identifier (may be empty; the builder then derives one)
    pub commit_sha: String,

    /// Repository owner/organization identifier, as given (not normalized)
    pub owner: String,

    /// Repository name
    pub repository: String,
}

/// Repository events that can start a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    Push,
    PullRequest,
}

impl std::fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerEvent::Push => write!(f, "push"),
            TriggerEvent::PullRequest => write!(f, "pull_request"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_trigger() -> TriggerContext {
        TriggerContext {
            event: TriggerEvent::Push,
            branch: "main".to_string(),
            commit_sha: "abc123".to_string(),
            owner: "Acme".to_string(),
            repository: "hivebox".to_string(),
        }
    }

    #[test]
    fn test_run_creation() {
        let run_id = Uuid::new_v4();
        let run = PipelineRun::new(run_id, "hivebox".to_string(), push_trigger());

        assert_eq!(run.id, run_id);
        assert_eq!(run.pipeline_name, "hivebox");
        assert!(!run.is_finished());
    }

    #[test]
    fn test_run_from_log() {
        let run_id = Uuid::new_v4();
        let header = RunHeader {
            id: run_id,
            pipeline_name: "hivebox".to_string(),
            trigger: push_trigger(),
            started_at: Utc::now(),
        };

        let events = vec![
            RunEvent::new(run_id, None, EventKind::RunStarted, "started".to_string()),
            RunEvent::new(
                run_id,
                Some("lint".to_string()),
                EventKind::StageStarted,
                "lint started".to_string(),
            ),
            RunEvent::new(
                run_id,
                Some("lint".to_string()),
                EventKind::StagePassed,
                "lint passed".to_string(),
            )
            .with_duration(900),
            RunEvent::new(run_id, None, EventKind::RunPassed, "passed".to_string()),
        ];

        let run = PipelineRun::from_log(header, &events);

        assert_eq!(run.id, run_id);
        assert!(run.is_passed());
        assert_eq!(run.stage_status("lint"), Some(StageStatus::Passed));
        assert_eq!(run.records[0].duration_ms, Some(900));
    }

    #[test]
    fn test_failed_stage_reason_survives_replay() {
        let run_id = Uuid::new_v4();
        let header = RunHeader {
            id: run_id,
            pipeline_name: "hivebox".to_string(),
            trigger: push_trigger(),
            started_at: Utc::now(),
        };

        let events = vec![
            RunEvent::new(
                run_id,
                Some("test".to_string()),
                EventKind::StageFailed,
                "test failed".to_string(),
            )
            .with_reason("command `pytest` exited with code 1".to_string()),
            RunEvent::new(
                run_id,
                Some("build".to_string()),
                EventKind::StageSkipped,
                "build skipped".to_string(),
            )
            .with_reason("upstream stage 'test' failed".to_string()),
            RunEvent::new(run_id, None, EventKind::RunFailed, "failed".to_string()),
        ];

        let run = PipelineRun::from_log(header, &events);

        assert!(!run.is_passed());
        assert_eq!(run.stage_status("build"), Some(StageStatus::Skipped));
        let failure = run.first_failure().unwrap();
        assert_eq!(failure.name, "test");
        assert!(failure.reason.as_ref().unwrap().contains("pytest"));
    }
}
