//! Artifact builds: image construction, tagging, and publication.
//!
//! The two-phase build itself (dependency install, then runtime-slim
//! copy) is the Dockerfile's contract; this module drives it, verifies
//! the runtime identity is unprivileged, and tags the result under the
//! normalized registry namespace.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::adapters::ContainerRuntime;
use crate::domain::{image_reference, Artifact, BuildError, StageError, TriggerContext};

use super::pipeline::BuildConfig;
use super::runner::{RunContext, StageExec};

/// Builds and publishes the pipeline artifact
pub struct ArtifactBuilder {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ArtifactBuilder {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Build the runtime image for a trigger and verify its execution
    /// identity.
    ///
    /// The image tag comes from the trigger's commit sha; when the
    /// trigger carries none, a fingerprint of the build context stands
    /// in so the tag stays content-derived.
    pub async fn build(
        &self,
        config: &BuildConfig,
        trigger: &TriggerContext,
    ) -> Result<Artifact, StageError> {
        let tag = if trigger.commit_sha.is_empty() {
            source_fingerprint(&config.context)
                .context("Failed to fingerprint the build context")?
        } else {
            trigger.commit_sha.clone()
        };

        let reference = image_reference(&config.registry, &trigger.owner, &config.service, &tag);
        info!(%reference, "Building image");

        self.runtime
            .build(&config.context, &config.dockerfile, &reference)
            .await?;

        // The runtime phase must have dropped privileges.
        let user = self.runtime.image_user(&reference).await?;
        if user.is_empty() || user == "root" || user == "0" {
            return Err(BuildError::RootUser {
                user: if user.is_empty() {
                    "root (unset)".to_string()
                } else {
                    user
                },
            }
            .into());
        }

        Ok(Artifact::new(reference).with_tag(tag))
    }

    /// Push a built artifact to the registry
    pub async fn publish(&self, artifact: &Artifact) -> Result<Artifact, StageError> {
        info!(reference = %artifact.image_reference, "Publishing image");

        let digest = self.runtime.push(&artifact.image_reference).await?;

        Ok(artifact.clone().with_digest(digest))
    }
}

/// Hash the build context so an untagged build still gets a stable,
/// content-derived identifier (first 12 hex chars of SHA-256).
pub fn source_fingerprint(context: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    hash_dir(context, &mut hasher)
        .with_context(|| format!("Failed to walk build context: {}", context.display()))?;

    let digest = hasher.finalize();
    Ok(hex::encode(&digest[..6]))
}

fn hash_dir(dir: &Path, hasher: &mut Sha256) -> std::io::Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(".git") {
            continue;
        }

        let path = entry.path();
        hasher.update(name.to_string_lossy().as_bytes());

        if path.is_dir() {
            hash_dir(&path, hasher)?;
        } else {
            hasher.update(std::fs::read(&path)?);
        }
    }

    Ok(())
}

/// Build stage: produces the run's artifact
pub struct BuildStage {
    builder: ArtifactBuilder,
    config: BuildConfig,
    trigger: TriggerContext,
}

impl BuildStage {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        config: BuildConfig,
        trigger: TriggerContext,
    ) -> Self {
        Self {
            builder: ArtifactBuilder::new(runtime),
            config,
            trigger,
        }
    }
}

#[async_trait]
impl StageExec for BuildStage {
    fn name(&self) -> &str {
        "build"
    }

    fn required(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<(), StageError> {
        let artifact = self.builder.build(&self.config, &self.trigger).await?;
        ctx.artifact = Some(artifact);
        Ok(())
    }
}

/// Publish stage: pushes the built artifact to the registry
pub struct PublishStage {
    builder: ArtifactBuilder,
}

impl PublishStage {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            builder: ArtifactBuilder::new(runtime),
        }
    }
}

#[async_trait]
impl StageExec for PublishStage {
    fn name(&self) -> &str {
        "publish"
    }

    fn required(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<(), StageError> {
        let artifact = ctx
            .artifact
            .as_ref()
            .ok_or_else(|| StageError::Other(anyhow::anyhow!("no artifact to publish")))?;

        let published = self.builder.publish(artifact).await?;
        ctx.artifact = Some(published);
        Ok(())
    }
}
