//! Pipeline orchestration: composes the fixed stage sequence.
//!
//! Order is fixed by design: lint (blocking subset) -> style lint
//! (advisory) -> test -> quality gate -> build -> publish -> verify.
//! Later stages consume artifacts and verdicts produced by earlier ones,
//! so stages never run in parallel within one run.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::adapters::{
    AnalysisClient, CommandExecutor, ContainerRuntime, DockerCli, ProcessExecutor, SonarClient,
};
use crate::config::ResolvedConfig;
use crate::domain::{EventKind, PipelineRun, RunEvent, StageStatus, TriggerContext};

use super::builder::{BuildStage, PublishStage};
use super::gate::GateStage;
use super::pipeline::Pipeline;
use super::run_log::RunLog;
use super::runner::{CommandStage, RunContext, StageExec, StageRunner};
use super::verifier::VerifyStage;

/// Composes stages into one gated pipeline run
pub struct Orchestrator {
    executor: Arc<dyn CommandExecutor>,
    runtime: Arc<dyn ContainerRuntime>,
    analysis: Arc<dyn AnalysisClient>,
    runs_dir: PathBuf,
}

impl Orchestrator {
    /// Create an orchestrator with explicit collaborators (tests inject
    /// fakes here)
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        runtime: Arc<dyn ContainerRuntime>,
        analysis: Arc<dyn AnalysisClient>,
        runs_dir: PathBuf,
    ) -> Self {
        Self {
            executor,
            runtime,
            analysis,
            runs_dir,
        }
    }

    /// Create an orchestrator wired to the real tool adapters
    pub fn from_config(cfg: &ResolvedConfig) -> Self {
        let mut docker = DockerCli::new();
        if let Some(ref token) = cfg.registry_token {
            docker = docker.with_login(crate::adapters::docker::RegistryLogin {
                host: cfg.registry_host.clone(),
                username: cfg.owner.clone(),
                token: token.clone(),
            });
        }

        Self {
            executor: Arc::new(ProcessExecutor::new()),
            runtime: Arc::new(docker),
            analysis: Arc::new(SonarClient::new(
                cfg.analysis_base_url.clone(),
                cfg.analysis_token.clone(),
            )),
            runs_dir: cfg.runs_dir(),
        }
    }

    /// Execute a pipeline for a trigger and return the recorded run.
    ///
    /// Stage failures are recorded in the run; `Err` means the run could
    /// not be executed at all (bad trigger, unwritable run log).
    #[instrument(skip(self, pipeline, trigger), fields(pipeline = %pipeline.name))]
    pub async fn execute(
        &self,
        pipeline: &Pipeline,
        trigger: TriggerContext,
    ) -> Result<PipelineRun> {
        pipeline.validate()?;

        if trigger.branch != pipeline.branch {
            anyhow::bail!(
                "trigger branch '{}' does not target protected branch '{}'",
                trigger.branch,
                pipeline.branch
            );
        }

        let run_id = Uuid::new_v4();
        info!(%run_id, event = %trigger.event, commit = %trigger.commit_sha, "Starting pipeline run");

        let log = RunLog::open(&self.runs_dir, run_id).await?;
        let mut run = PipelineRun::new(run_id, pipeline.name.clone(), trigger.clone());
        log.write_header(&run.header()).await?;
        log.append(&RunEvent::new(
            run_id,
            None,
            EventKind::RunStarted,
            format!("Pipeline '{}' started", pipeline.name),
        ))
        .await?;

        let stages = self.assemble(pipeline, &trigger, run_id);

        let mut ctx = RunContext::default();
        StageRunner::new(&log)
            .run(&mut run, &stages, &mut ctx)
            .await?;

        run.completed_at = Some(chrono::Utc::now());

        // Human-readable report for downstream consumers.
        let summary = render_summary(&run, ctx.outputs.get("test").map(String::as_str));
        let summary_path = log.store_summary(&summary).await?;
        info!(path = %summary_path.display(), "Run summary written");

        let (kind, detail) = if run.is_passed() {
            (
                EventKind::RunPassed,
                format!("Pipeline '{}' passed", pipeline.name),
            )
        } else {
            (
                EventKind::RunFailed,
                format!("Pipeline '{}' failed", pipeline.name),
            )
        };
        log.append(&RunEvent::new(run_id, None, kind, detail)).await?;

        Ok(run)
    }

    /// Load a recorded run by ID
    pub async fn get_run(&self, run_id: Uuid) -> Result<PipelineRun> {
        let log = RunLog::open(&self.runs_dir, run_id).await?;
        let header = log
            .read_header()
            .await
            .with_context(|| format!("Run {} not found", run_id))?;
        let events = log.replay().await?;

        Ok(PipelineRun::from_log(header, &events))
    }

    /// List recent recorded runs, most recent first
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<PipelineRun>> {
        let run_ids = RunLog::list_runs(&self.runs_dir).await?;
        let mut runs = Vec::new();

        for run_id in run_ids {
            if let Ok(run) = self.get_run(run_id).await {
                runs.push(run);
            }
        }

        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);

        Ok(runs)
    }

    fn assemble(
        &self,
        pipeline: &Pipeline,
        trigger: &TriggerContext,
        run_id: Uuid,
    ) -> Vec<Box<dyn StageExec>> {
        let mut stages: Vec<Box<dyn StageExec>> = Vec::new();

        for spec in &pipeline.stages {
            stages.push(Box::new(CommandStage::new(
                spec.clone(),
                pipeline.stage_timeout_seconds,
                self.executor.clone(),
            )));
        }

        // The scanner submits analyses keyed by commit; an untagged
        // trigger falls back to the run id.
        let analysis_id = if trigger.commit_sha.is_empty() {
            run_id.to_string()
        } else {
            trigger.commit_sha.clone()
        };

        stages.push(Box::new(GateStage::new(
            self.analysis.clone(),
            pipeline.quality_gate.clone(),
            analysis_id,
        )));
        stages.push(Box::new(BuildStage::new(
            self.runtime.clone(),
            pipeline.build.clone(),
            trigger.clone(),
        )));
        stages.push(Box::new(PublishStage::new(self.runtime.clone())));
        stages.push(Box::new(VerifyStage::new(
            self.runtime.clone(),
            pipeline.probe.clone(),
            pipeline.build.port,
        )));

        stages
    }
}

/// Render the run's human-readable summary report.
///
/// The captured test output is included verbatim so existing coverage
/// report consumers keep their format.
pub fn render_summary(run: &PipelineRun, test_output: Option<&str>) -> String {
    let mut out = String::new();

    out.push_str(&format!("pipeline: {}\n", run.pipeline_name));
    out.push_str(&format!("run:      {}\n", run.id));
    out.push_str(&format!(
        "trigger:  {} {} @ {}\n",
        run.trigger.event, run.trigger.branch, run.trigger.commit_sha
    ));
    out.push_str(&format!("overall:  {:?}\n\n", run.overall));

    out.push_str(&format!("{:<14} {:<9} {:<10} reason\n", "stage", "status", "duration"));
    for record in &run.records {
        let duration = record
            .duration_ms
            .map(format_duration)
            .unwrap_or_else(|| "-".to_string());
        let reason = record.reason.as_deref().unwrap_or("-");
        out.push_str(&format!(
            "{:<14} {:<9} {:<10} {}\n",
            record.name,
            format!("{:?}", record.status).to_lowercase(),
            duration,
            reason
        ));
    }

    if let Some(output) = test_output {
        out.push_str("\n--- test output ---\n");
        out.push_str(output);
        if !output.ends_with('\n') {
            out.push('\n');
        }
    }

    out
}

fn format_duration(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}

/// Exit hint for CLI consumers: non-zero iff a required stage failed or
/// was skipped
pub fn exit_code(run: &PipelineRun) -> i32 {
    if run.is_passed() {
        0
    } else {
        1
    }
}

/// First failure a human should look at, preferring failed over skipped
pub fn first_problem(run: &PipelineRun) -> Option<String> {
    run.first_failure()
        .map(|r| {
            format!(
                "stage '{}' failed: {}",
                r.name,
                r.reason.as_deref().unwrap_or("unknown reason")
            )
        })
        .or_else(|| {
            run.records
                .iter()
                .find(|r| r.status == StageStatus::Skipped)
                .map(|r| format!("stage '{}' skipped", r.name))
        })
}
