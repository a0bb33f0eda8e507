//! Deployment verification: run the artifact and probe it until ready.
//!
//! State machine: Starting -> Polling -> {Verified, UnexpectedBody,
//! ProbeTimeout} -> CleanedUp. Teardown of the instance runs on every
//! exit path so no instance leaks across pipeline invocations.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::adapters::ContainerRuntime;
use crate::domain::{Artifact, StageError};

use super::pipeline::ProbeSpec;
use super::runner::{RunContext, StageExec};

/// Starts one instance of an artifact and verifies its readiness contract
pub struct DeploymentVerifier {
    runtime: Arc<dyn ContainerRuntime>,
    client: reqwest::Client,
}

impl DeploymentVerifier {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            client: reqwest::Client::new(),
        }
    }

    /// Verify a deployed artifact against a probe spec.
    ///
    /// The host port binding is exclusive for the duration of this call
    /// and released by the unconditional teardown before returning.
    pub async fn verify(
        &self,
        artifact: &Artifact,
        probe: &ProbeSpec,
        host_port: u16,
        container_port: u16,
    ) -> Result<(), StageError> {
        let container_id = self
            .runtime
            .start(&artifact.image_reference, host_port, container_port)
            .await
            .map_err(StageError::Other)?;

        info!(
            container = %container_id,
            reference = %artifact.image_reference,
            "Verification instance started"
        );

        let verdict = self.poll(probe).await;

        // Teardown runs exactly once, on success and on every failure kind.
        if let Err(e) = self.runtime.stop_and_remove(&container_id).await {
            warn!(container = %container_id, error = %e, "Failed to remove verification instance");
        } else {
            debug!(container = %container_id, "Verification instance removed");
        }

        verdict
    }

    /// Poll the readiness endpoint until the status code matches, then
    /// perform the single body check.
    async fn poll(&self, probe: &ProbeSpec) -> Result<(), StageError> {
        let started = Instant::now();

        loop {
            match self.client.get(&probe.target_url).send().await {
                Ok(response) if response.status().as_u16() == probe.expected_status => {
                    let body = response
                        .text()
                        .await
                        .map_err(|e| StageError::Other(e.into()))?;
                    let body = body.trim();

                    return if body == probe.expected_body {
                        info!(url = %probe.target_url, "Deployment verified");
                        Ok(())
                    } else {
                        Err(StageError::UnexpectedBody {
                            expected: probe.expected_body.clone(),
                            actual: body.to_string(),
                        })
                    };
                }
                Ok(response) => {
                    debug!(
                        url = %probe.target_url,
                        status = response.status().as_u16(),
                        "Probe target not ready"
                    );
                }
                Err(e) => {
                    debug!(url = %probe.target_url, error = %e, "Probe connection failed");
                }
            }

            if started.elapsed() >= probe.timeout() {
                return Err(StageError::ProbeTimeout {
                    timeout_seconds: probe.timeout_seconds,
                });
            }

            tokio::time::sleep(probe.interval()).await;
        }
    }
}

/// Verify stage: smoke test against the freshly published artifact
pub struct VerifyStage {
    verifier: DeploymentVerifier,
    probe: ProbeSpec,
    port: u16,
}

impl VerifyStage {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, probe: ProbeSpec, port: u16) -> Self {
        Self {
            verifier: DeploymentVerifier::new(runtime),
            probe,
            port,
        }
    }
}

#[async_trait]
impl StageExec for VerifyStage {
    fn name(&self) -> &str {
        "verify"
    }

    fn required(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<(), StageError> {
        let artifact = ctx
            .artifact
            .as_ref()
            .ok_or_else(|| StageError::Other(anyhow::anyhow!("no artifact to verify")))?;

        self.verifier
            .verify(artifact, &self.probe, self.port, self.port)
            .await
    }
}
