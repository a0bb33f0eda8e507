//! Gating Integration Tests
//!
//! A required stage's failure must skip every downstream stage; advisory
//! stages never block.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

use beeline::core::{RunContext, RunLog, StageExec, StageRunner};
use beeline::domain::{
    EventKind, OverallStatus, PipelineRun, StageError, StageStatus, TriggerContext, TriggerEvent,
};

struct ScriptedStage {
    name: String,
    required: bool,
    fail: bool,
    executions: Arc<AtomicUsize>,
}

impl ScriptedStage {
    fn boxed(name: &str, required: bool, fail: bool) -> (Box<dyn StageExec>, Arc<AtomicUsize>) {
        let executions = Arc::new(AtomicUsize::new(0));
        let stage = Box::new(Self {
            name: name.to_string(),
            required,
            fail,
            executions: executions.clone(),
        });
        (stage, executions)
    }
}

#[async_trait]
impl StageExec for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn required(&self) -> bool {
        self.required
    }

    async fn run(&self, _ctx: &mut RunContext) -> Result<(), StageError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(StageError::StageFailure {
                command: format!("{} tool", self.name),
                code: 1,
            })
        } else {
            Ok(())
        }
    }
}

fn trigger() -> TriggerContext {
    TriggerContext {
        event: TriggerEvent::Push,
        branch: "main".to_string(),
        commit_sha: "abc123".to_string(),
        owner: "acme".to_string(),
        repository: "hivebox".to_string(),
    }
}

async fn run_stages(
    stages: Vec<Box<dyn StageExec>>,
) -> (PipelineRun, RunLog, TempDir) {
    let temp = TempDir::new().unwrap();
    let run_id = Uuid::new_v4();
    let log = RunLog::open(temp.path(), run_id).await.unwrap();
    let mut run = PipelineRun::new(run_id, "hivebox".to_string(), trigger());
    let mut ctx = RunContext::default();

    StageRunner::new(&log)
        .run(&mut run, &stages, &mut ctx)
        .await
        .unwrap();

    (run, log, temp)
}

#[tokio::test]
async fn test_required_failure_skips_all_downstream_stages() {
    let (lint, _) = ScriptedStage::boxed("lint", true, true);
    let (test, test_runs) = ScriptedStage::boxed("test", true, false);
    let (build, build_runs) = ScriptedStage::boxed("build", true, false);

    let (run, _log, _temp) = run_stages(vec![lint, test, build]).await;

    assert_eq!(run.stage_status("lint"), Some(StageStatus::Failed));
    assert_eq!(run.stage_status("test"), Some(StageStatus::Skipped));
    assert_eq!(run.stage_status("build"), Some(StageStatus::Skipped));
    assert_eq!(run.overall, OverallStatus::Failed);

    // Skipped stages never executed
    assert_eq!(test_runs.load(Ordering::SeqCst), 0);
    assert_eq!(build_runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_advisory_failure_never_blocks() {
    let (style, _) = ScriptedStage::boxed("lint-style", false, true);
    let (test, test_runs) = ScriptedStage::boxed("test", true, false);

    let (run, _log, _temp) = run_stages(vec![style, test]).await;

    assert_eq!(run.stage_status("lint-style"), Some(StageStatus::Failed));
    assert_eq!(run.stage_status("test"), Some(StageStatus::Passed));
    assert_eq!(run.overall, OverallStatus::Passed);
    assert_eq!(test_runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_completed_stages_retain_status_after_later_failure() {
    let (lint, _) = ScriptedStage::boxed("lint", true, false);
    let (test, _) = ScriptedStage::boxed("test", true, true);
    let (build, _) = ScriptedStage::boxed("build", true, false);

    let (run, _log, _temp) = run_stages(vec![lint, test, build]).await;

    assert_eq!(run.stage_status("lint"), Some(StageStatus::Passed));
    assert_eq!(run.stage_status("test"), Some(StageStatus::Failed));
    assert_eq!(run.stage_status("build"), Some(StageStatus::Skipped));
}

#[tokio::test]
async fn test_skip_events_land_in_the_log() {
    let (lint, _) = ScriptedStage::boxed("lint", true, true);
    let (build, _) = ScriptedStage::boxed("build", true, false);

    let (run, log, _temp) = run_stages(vec![lint, build]).await;

    let events = log.replay().await.unwrap();
    let skip = events
        .iter()
        .find(|e| e.kind == EventKind::StageSkipped)
        .expect("a StageSkipped event is recorded");

    assert_eq!(skip.stage.as_deref(), Some("build"));
    assert!(skip.reason.as_ref().unwrap().contains("lint"));
    assert_eq!(skip.run_id, run.id);
}

#[tokio::test]
async fn test_failure_reason_is_recorded_per_stage() {
    let (lint, _) = ScriptedStage::boxed("lint", true, true);

    let (run, _log, _temp) = run_stages(vec![lint]).await;

    let failure = run.first_failure().unwrap();
    assert_eq!(failure.name, "lint");
    assert!(failure.reason.as_ref().unwrap().contains("stage-failure"));
    assert!(failure.reason.as_ref().unwrap().contains("lint tool"));
}

#[tokio::test]
async fn test_replay_reconstructs_live_run() {
    let (lint, _) = ScriptedStage::boxed("lint", true, false);
    let (test, _) = ScriptedStage::boxed("test", true, true);

    let (run, log, _temp) = run_stages(vec![lint, test]).await;
    log.write_header(&run.header()).await.unwrap();

    let header = log.read_header().await.unwrap();
    let events = log.replay().await.unwrap();
    let replayed = PipelineRun::from_log(header, &events);

    assert_eq!(replayed.id, run.id);
    assert_eq!(replayed.stage_status("lint"), Some(StageStatus::Passed));
    assert_eq!(replayed.stage_status("test"), Some(StageStatus::Failed));
}
