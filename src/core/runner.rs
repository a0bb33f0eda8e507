//! Stage execution with required-stage gating.
//!
//! Stages run strictly in declared order. Once a required stage fails,
//! every not-yet-started stage is marked Skipped; completed stages keep
//! their recorded status.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::domain::{
    Artifact, EventKind, PipelineRun, RunEvent, StageError, StageRecord,
};

use super::gate::QualityGateResult;
use super::pipeline::StageSpec;
use super::run_log::RunLog;
use crate::adapters::CommandExecutor;

/// A unit of pipeline work with a pass/fail outcome
#[async_trait]
pub trait StageExec: Send + Sync {
    /// Stage name, unique within one run
    fn name(&self) -> &str;

    /// Whether a failure halts all downstream stages
    fn required(&self) -> bool;

    /// Execute the stage against the shared run context
    async fn run(&self, ctx: &mut RunContext) -> Result<(), StageError>;
}

/// Mutable state handed from stage to stage within one run.
///
/// A stage's outputs are fully materialized here before the next stage
/// starts; there is no cross-stage concurrency.
#[derive(Default)]
pub struct RunContext {
    /// Captured stdout per command stage (used for the report summary)
    pub outputs: HashMap<String, String>,

    /// Image produced by the build stage
    pub artifact: Option<Artifact>,

    /// Verdict recorded by the quality gate stage
    pub gate_result: Option<QualityGateResult>,
}

/// Executes an ordered stage sequence with gating
pub struct StageRunner<'a> {
    log: &'a RunLog,
}

impl<'a> StageRunner<'a> {
    pub fn new(log: &'a RunLog) -> Self {
        Self { log }
    }

    /// Run every stage in order, recording one status record per stage.
    ///
    /// Stage failures end up in the run's records, not in the returned
    /// `Result`; `Err` here means the run log itself could not be written.
    pub async fn run(
        &self,
        run: &mut PipelineRun,
        stages: &[Box<dyn StageExec>],
        ctx: &mut RunContext,
    ) -> Result<()> {
        let mut halted_by: Option<String> = None;

        for stage in stages {
            let name = stage.name().to_string();

            if let Some(ref culprit) = halted_by {
                let reason = format!("upstream stage '{}' failed", culprit);
                info!(stage = %name, %reason, "Stage skipped");

                run.record(StageRecord::skipped(name.as_str(), reason.clone()));
                self.log
                    .append(
                        &RunEvent::new(
                            run.id,
                            Some(name.clone()),
                            EventKind::StageSkipped,
                            format!("Stage '{}' skipped", name),
                        )
                        .with_reason(reason),
                    )
                    .await?;
                continue;
            }

            info!(stage = %name, required = stage.required(), "Stage started");
            self.log
                .append(&RunEvent::new(
                    run.id,
                    Some(name.clone()),
                    EventKind::StageStarted,
                    format!("Stage '{}' started", name),
                ))
                .await?;

            let started = Instant::now();
            let outcome = stage.run(ctx).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(()) => {
                    info!(stage = %name, duration_ms, "Stage passed");

                    run.record(StageRecord::passed(name.as_str(), duration_ms));
                    self.log
                        .append(
                            &RunEvent::new(
                                run.id,
                                Some(name.clone()),
                                EventKind::StagePassed,
                                format!("Stage '{}' passed in {}ms", name, duration_ms),
                            )
                            .with_duration(duration_ms),
                        )
                        .await?;
                }
                Err(e) => {
                    let reason = format!("{}: {}", e.label(), e);

                    run.record(StageRecord::failed(name.as_str(), duration_ms, reason.clone()));
                    self.log
                        .append(
                            &RunEvent::new(
                                run.id,
                                Some(name.clone()),
                                EventKind::StageFailed,
                                format!("Stage '{}' failed after {}ms", name, duration_ms),
                            )
                            .with_duration(duration_ms)
                            .with_reason(reason),
                        )
                        .await?;

                    if stage.required() {
                        error!(stage = %name, error = %e, "Required stage failed, halting pipeline");
                        halted_by = Some(name);
                    } else {
                        warn!(stage = %name, error = %e, "Advisory stage failed, continuing");
                    }
                }
            }
        }

        run.overall = if halted_by.is_some() {
            crate::domain::OverallStatus::Failed
        } else {
            crate::domain::OverallStatus::Passed
        };

        Ok(())
    }
}

/// Command stage: runs declared tool commands through an executor
pub struct CommandStage {
    spec: StageSpec,
    default_timeout_seconds: u64,
    executor: Arc<dyn CommandExecutor>,
}

impl CommandStage {
    pub fn new(
        spec: StageSpec,
        default_timeout_seconds: u64,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            spec,
            default_timeout_seconds,
            executor,
        }
    }
}

#[async_trait]
impl StageExec for CommandStage {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn required(&self) -> bool {
        self.spec.required
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<(), StageError> {
        let timeout = self.spec.timeout(self.default_timeout_seconds);
        let mut captured = String::new();

        for argv in &self.spec.commands {
            let output = self.executor.run(argv, timeout).await?;
            captured.push_str(&output.stdout);

            if !output.success() {
                ctx.outputs.insert(self.spec.name.clone(), captured);
                return Err(StageError::StageFailure {
                    command: argv.join(" "),
                    code: output.exit_code,
                });
            }
        }

        ctx.outputs.insert(self.spec.name.clone(), captured);
        Ok(())
    }
}
