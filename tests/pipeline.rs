//! Pipeline Integration Tests
//!
//! End-to-end orchestration with scripted tool adapters: full pass,
//! required-lint failure, gate timeout, and the protected-branch rule.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use beeline::adapters::{AnalysisClient, CommandExecutor, ContainerRuntime, ExecOutput, GateStatus};
use beeline::core::orchestrator::exit_code;
use beeline::core::{Orchestrator, Pipeline};
use beeline::domain::{
    BuildError, OverallStatus, StageStatus, TriggerContext, TriggerEvent,
};

struct ScriptedExecutor {
    fail_programs: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    fn new(fail_programs: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            fail_programs: fail_programs.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, argv: &[String], _timeout: Duration) -> Result<ExecOutput> {
        self.calls.lock().unwrap().push(argv[0].clone());
        let fail = self.fail_programs.iter().any(|p| argv[0].contains(p));

        Ok(ExecOutput {
            exit_code: if fail { 1 } else { 0 },
            stdout: format!("{} output\nTOTAL 87%\n", argv[0]),
            stderr: String::new(),
        })
    }
}

struct RecordingRuntime {
    built: Mutex<Vec<String>>,
    started: AtomicUsize,
    removed: AtomicUsize,
}

impl RecordingRuntime {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            built: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
            removed: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ContainerRuntime for RecordingRuntime {
    async fn build(
        &self,
        _context: &Path,
        _dockerfile: &Path,
        reference: &str,
    ) -> Result<(), BuildError> {
        self.built.lock().unwrap().push(reference.to_string());
        Ok(())
    }

    async fn image_user(&self, _reference: &str) -> Result<String, BuildError> {
        Ok("appuser".to_string())
    }

    async fn push(&self, _reference: &str) -> Result<Option<String>, BuildError> {
        Ok(Some("sha256:deadbeef".to_string()))
    }

    async fn start(&self, _reference: &str, _host: u16, _container: u16) -> Result<String> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok("cafe0123".to_string())
    }

    async fn stop_and_remove(&self, _container_id: &str) -> Result<()> {
        self.removed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FixedAnalysis {
    status: GateStatus,
    polls: AtomicUsize,
}

impl FixedAnalysis {
    fn new(status: GateStatus) -> Arc<Self> {
        Arc::new(Self {
            status,
            polls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AnalysisClient for FixedAnalysis {
    async fn gate_status(&self, _analysis_id: &str) -> Result<GateStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.status.clone())
    }
}

/// Minimal HTTP stub that always serves one response.
async fn spawn_stub(status: u16, body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };

            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;

            let response = format!(
                "HTTP/1.1 {} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    addr
}

fn fast_pipeline(probe_addr: SocketAddr) -> Pipeline {
    let mut pipeline = Pipeline::hivebox();
    pipeline.quality_gate.poll_interval_seconds = 0;
    pipeline.quality_gate.timeout_seconds = 5;
    pipeline.probe.target_url = format!("http://{}/version", probe_addr);
    pipeline.probe.interval_seconds = 0;
    pipeline.probe.timeout_seconds = 5;
    pipeline
}

fn push_to(branch: &str) -> TriggerContext {
    TriggerContext {
        event: TriggerEvent::Push,
        branch: branch.to_string(),
        commit_sha: "abc123".to_string(),
        owner: "Acme".to_string(),
        repository: "hivebox".to_string(),
    }
}

#[tokio::test]
async fn test_full_pass_publishes_and_verifies() {
    let addr = spawn_stub(200, "\"0.0.1\"").await;
    let temp = TempDir::new().unwrap();
    let executor = ScriptedExecutor::new(&[]);
    let runtime = RecordingRuntime::new();
    let analysis = FixedAnalysis::new(GateStatus::Passed);

    let orchestrator = Orchestrator::new(
        executor.clone(),
        runtime.clone(),
        analysis.clone(),
        temp.path().to_path_buf(),
    );

    let run = orchestrator
        .execute(&fast_pipeline(addr), push_to("main"))
        .await
        .unwrap();

    assert_eq!(run.overall, OverallStatus::Passed);
    assert_eq!(exit_code(&run), 0);

    // Fixed stage order.
    let names: Vec<&str> = run.records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["lint", "lint-style", "test", "quality-gate", "build", "publish", "verify"]
    );

    // The image landed under the lowercased owner namespace.
    let built = runtime.built.lock().unwrap();
    assert_eq!(built.as_slice(), ["ghcr.io/acme/hivebox:abc123"]);

    // The verification instance was started and cleaned up.
    assert_eq!(runtime.started.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.removed.load(Ordering::SeqCst), 1);

    // The run directory holds the human-readable summary.
    let summary_path = temp.path().join(run.id.to_string()).join("summary.txt");
    let summary = std::fs::read_to_string(summary_path).unwrap();
    assert!(summary.contains("overall:"));
    assert!(summary.contains("TOTAL 87%"));
}

#[tokio::test]
async fn test_lint_syntax_error_skips_everything_downstream() {
    let addr = spawn_stub(200, "\"0.0.1\"").await;
    let temp = TempDir::new().unwrap();
    let executor = ScriptedExecutor::new(&["flake8"]);
    let runtime = RecordingRuntime::new();
    let analysis = FixedAnalysis::new(GateStatus::Passed);

    let orchestrator = Orchestrator::new(
        executor.clone(),
        runtime.clone(),
        analysis.clone(),
        temp.path().to_path_buf(),
    );

    let run = orchestrator
        .execute(&fast_pipeline(addr), push_to("main"))
        .await
        .unwrap();

    assert_eq!(run.overall, OverallStatus::Failed);
    assert_eq!(exit_code(&run), 1);
    assert_eq!(run.stage_status("lint"), Some(StageStatus::Failed));
    for stage in ["lint-style", "test", "quality-gate", "build", "publish", "verify"] {
        assert_eq!(run.stage_status(stage), Some(StageStatus::Skipped), "{}", stage);
    }

    // Nothing downstream actually ran.
    assert_eq!(analysis.polls.load(Ordering::SeqCst), 0);
    assert!(runtime.built.lock().unwrap().is_empty());
    assert_eq!(runtime.started.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_style_lint_failure_is_advisory() {
    let addr = spawn_stub(200, "\"0.0.1\"").await;
    let temp = TempDir::new().unwrap();
    let executor = ScriptedExecutor::new(&["pylint"]);
    let runtime = RecordingRuntime::new();
    let analysis = FixedAnalysis::new(GateStatus::Passed);

    let orchestrator = Orchestrator::new(
        executor,
        runtime.clone(),
        analysis,
        temp.path().to_path_buf(),
    );

    let run = orchestrator
        .execute(&fast_pipeline(addr), push_to("main"))
        .await
        .unwrap();

    // Style findings never block the pipeline.
    assert_eq!(run.stage_status("lint-style"), Some(StageStatus::Failed));
    assert_eq!(run.overall, OverallStatus::Passed);
    assert_eq!(runtime.started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_gate_timeout_blocks_publish_but_keeps_earlier_results() {
    let addr = spawn_stub(200, "\"0.0.1\"").await;
    let temp = TempDir::new().unwrap();
    let executor = ScriptedExecutor::new(&[]);
    let runtime = RecordingRuntime::new();
    let analysis = FixedAnalysis::new(GateStatus::Pending);

    let orchestrator = Orchestrator::new(
        executor,
        runtime.clone(),
        analysis,
        temp.path().to_path_buf(),
    );

    let mut pipeline = fast_pipeline(addr);
    pipeline.quality_gate.timeout_seconds = 0;

    let run = orchestrator.execute(&pipeline, push_to("main")).await.unwrap();

    assert_eq!(run.overall, OverallStatus::Failed);
    assert_eq!(run.stage_status("test"), Some(StageStatus::Passed));
    assert_eq!(run.stage_status("quality-gate"), Some(StageStatus::Failed));
    assert_eq!(run.stage_status("build"), Some(StageStatus::Skipped));

    // The reason names the timeout, not a gate rejection.
    let failure = run.first_failure().unwrap();
    assert!(failure.reason.as_ref().unwrap().contains("gate-timeout"));
    assert!(runtime.built.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_trigger_must_target_protected_branch() {
    let addr = spawn_stub(200, "\"0.0.1\"").await;
    let temp = TempDir::new().unwrap();
    let orchestrator = Orchestrator::new(
        ScriptedExecutor::new(&[]),
        RecordingRuntime::new(),
        FixedAnalysis::new(GateStatus::Passed),
        temp.path().to_path_buf(),
    );

    let result = orchestrator
        .execute(&fast_pipeline(addr), push_to("feature/probe"))
        .await;

    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("protected branch"));
    // No run directory was created for the rejected trigger.
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_recorded_run_is_listable_and_reloadable() {
    let addr = spawn_stub(200, "\"0.0.1\"").await;
    let temp = TempDir::new().unwrap();
    let orchestrator = Orchestrator::new(
        ScriptedExecutor::new(&[]),
        RecordingRuntime::new(),
        FixedAnalysis::new(GateStatus::Passed),
        temp.path().to_path_buf(),
    );

    let run = orchestrator
        .execute(&fast_pipeline(addr), push_to("main"))
        .await
        .unwrap();

    let reloaded = orchestrator.get_run(run.id).await.unwrap();
    assert_eq!(reloaded.overall, OverallStatus::Passed);
    assert_eq!(reloaded.stage_status("verify"), Some(StageStatus::Passed));

    let listed = orchestrator.list_runs(10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, run.id);
}
