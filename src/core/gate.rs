//! Quality gate evaluation with a bounded polling wait.
//!
//! The evaluator never treats a missing verdict as a pass: a gate that
//! times out is GateTimeout, distinct from GateFailed.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::adapters::{AnalysisClient, GateStatus};
use crate::domain::StageError;

use super::pipeline::GateConfig;
use super::runner::{RunContext, StageExec};

/// Terminal verdict of one gate evaluation
#[derive(Debug, Clone)]
pub struct QualityGateResult {
    /// Final status (never Pending once returned)
    pub status: GateStatus,

    /// When the deciding poll happened
    pub polled_at: DateTime<Utc>,
}

/// Polls the analysis service until a verdict or a ceiling
pub struct QualityGateEvaluator {
    client: Arc<dyn AnalysisClient>,
}

impl QualityGateEvaluator {
    pub fn new(client: Arc<dyn AnalysisClient>) -> Self {
        Self { client }
    }

    /// Wait for a terminal verdict on an analysis submission.
    ///
    /// Polls at `config.poll_interval()` with a sleep between attempts;
    /// exceeding `config.timeout()` without a verdict is GateTimeout.
    pub async fn evaluate(
        &self,
        analysis_id: &str,
        config: &GateConfig,
    ) -> Result<QualityGateResult, StageError> {
        let started = Instant::now();

        loop {
            let status = self.client.gate_status(analysis_id).await?;
            let polled_at = Utc::now();

            match status {
                GateStatus::Passed => {
                    info!(analysis_id, "Quality gate passed");
                    return Ok(QualityGateResult {
                        status: GateStatus::Passed,
                        polled_at,
                    });
                }
                GateStatus::Failed { reason } => {
                    return Err(StageError::GateFailed { reason });
                }
                GateStatus::Pending => {
                    debug!(
                        analysis_id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Quality gate verdict pending"
                    );
                }
            }

            if started.elapsed() >= config.timeout() {
                return Err(StageError::GateTimeout {
                    timeout_seconds: config.timeout_seconds,
                });
            }

            tokio::time::sleep(config.poll_interval()).await;
        }
    }
}

/// Gate stage: blocks publish/deploy on the analysis verdict
pub struct GateStage {
    evaluator: QualityGateEvaluator,
    config: GateConfig,
    analysis_id: String,
}

impl GateStage {
    pub fn new(client: Arc<dyn AnalysisClient>, config: GateConfig, analysis_id: String) -> Self {
        Self {
            evaluator: QualityGateEvaluator::new(client),
            config,
            analysis_id,
        }
    }
}

#[async_trait]
impl StageExec for GateStage {
    fn name(&self) -> &str {
        "quality-gate"
    }

    fn required(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<(), StageError> {
        let result = self.evaluator.evaluate(&self.analysis_id, &self.config).await?;
        ctx.gate_result = Some(result);
        Ok(())
    }
}
