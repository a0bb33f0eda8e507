//! Container runtime adapter backed by the `docker` CLI.
//!
//! Build failures are classified into distinct reasons from the tool's
//! stderr so the pipeline never reports one generic "build failed".

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::domain::BuildError;

use super::ExecOutput;

/// Trait for building, publishing, and running container images
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Build an image from a context directory and tag it
    async fn build(
        &self,
        context: &Path,
        dockerfile: &Path,
        reference: &str,
    ) -> Result<(), BuildError>;

    /// The user the image is configured to run as ("" means root)
    async fn image_user(&self, reference: &str) -> Result<String, BuildError>;

    /// Push an image, returning the registry digest when reported
    async fn push(&self, reference: &str) -> Result<Option<String>, BuildError>;

    /// Start a detached instance with a host-to-container port binding,
    /// returning its container id
    async fn start(&self, reference: &str, host_port: u16, container_port: u16) -> Result<String>;

    /// Stop and remove a running instance
    async fn stop_and_remove(&self, container_id: &str) -> Result<()>;
}

/// `docker` CLI implementation of [`ContainerRuntime`]
pub struct DockerCli {
    /// Path to the docker binary (default: "docker")
    binary_path: String,

    /// Ceiling for build/push invocations
    build_timeout: Duration,

    /// Registry credentials, fed to `docker login` before a push
    login: Option<RegistryLogin>,
}

/// Opaque registry credentials for publish
#[derive(Debug, Clone)]
pub struct RegistryLogin {
    pub host: String,
    pub username: String,
    pub token: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            binary_path: "docker".to_string(),
            build_timeout: Duration::from_secs(900),
            login: None,
        }
    }

    /// Use a custom binary path (e.g. podman's docker shim)
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            ..Self::new()
        }
    }

    /// Authenticate against a registry before pushing
    pub fn with_login(mut self, login: RegistryLogin) -> Self {
        self.login = Some(login);
        self
    }

    async fn run_docker(
        &self,
        args: &[&str],
        stdin: Option<&str>,
        ceiling: Duration,
    ) -> Result<ExecOutput> {
        let mut child = Command::new(&self.binary_path)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn `{} {}`", self.binary_path, args[0]))?;

        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input.as_bytes())
                    .await
                    .context("Failed to write to docker stdin")?;
                // Drop stdin to signal EOF
            }
        }

        let output = timeout(ceiling, child.wait_with_output())
            .await
            .with_context(|| format!("`docker {}` timed out after {:?}", args[0], ceiling))?
            .with_context(|| format!("Failed to wait for `docker {}`", args[0]))?;

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn build(
        &self,
        context: &Path,
        dockerfile: &Path,
        reference: &str,
    ) -> Result<(), BuildError> {
        let context_str = context.to_string_lossy();
        let dockerfile_str = dockerfile.to_string_lossy();
        let args = [
            "build",
            "--file",
            dockerfile_str.as_ref(),
            "--tag",
            reference,
            context_str.as_ref(),
        ];

        let output = self
            .run_docker(&args, None, self.build_timeout)
            .await
            .map_err(|e| BuildError::Other(e.to_string()))?;

        if !output.success() {
            return Err(classify_build_failure(&output.stderr));
        }

        Ok(())
    }

    async fn image_user(&self, reference: &str) -> Result<String, BuildError> {
        let args = ["inspect", "--format", "{{.Config.User}}", reference];

        let output = self
            .run_docker(&args, None, Duration::from_secs(30))
            .await
            .map_err(|e| BuildError::Other(e.to_string()))?;

        if !output.success() {
            return Err(BuildError::Other(format!(
                "failed to inspect image {}: {}",
                reference,
                output.stderr.trim()
            )));
        }

        Ok(output.stdout.trim().to_string())
    }

    async fn push(&self, reference: &str) -> Result<Option<String>, BuildError> {
        if let Some(ref login) = self.login {
            let args = [
                "login",
                login.host.as_str(),
                "--username",
                login.username.as_str(),
                "--password-stdin",
            ];
            let output = self
                .run_docker(&args, Some(&login.token), Duration::from_secs(60))
                .await
                .map_err(|e| BuildError::Other(e.to_string()))?;

            if !output.success() {
                return Err(BuildError::RegistryAuth(output.stderr.trim().to_string()));
            }
        }

        let output = self
            .run_docker(&["push", reference], None, self.build_timeout)
            .await
            .map_err(|e| BuildError::Other(e.to_string()))?;

        if !output.success() {
            return Err(classify_build_failure(&output.stderr));
        }

        // Best effort: the digest shows up in RepoDigests after a push.
        let inspect = self
            .run_docker(
                &["inspect", "--format", "{{index .RepoDigests 0}}", reference],
                None,
                Duration::from_secs(30),
            )
            .await;

        match inspect {
            Ok(output) if output.success() => {
                let digest = output.stdout.trim().to_string();
                Ok(if digest.is_empty() { None } else { Some(digest) })
            }
            _ => Ok(None),
        }
    }

    async fn start(&self, reference: &str, host_port: u16, container_port: u16) -> Result<String> {
        let binding = format!("{}:{}", host_port, container_port);
        let args = ["run", "--detach", "--publish", binding.as_str(), reference];

        let output = self.run_docker(&args, None, Duration::from_secs(120)).await?;

        if !output.success() {
            anyhow::bail!(
                "failed to start instance of {}: {}",
                reference,
                output.stderr.trim()
            );
        }

        Ok(output.stdout.trim().to_string())
    }

    async fn stop_and_remove(&self, container_id: &str) -> Result<()> {
        let args = ["rm", "--force", container_id];

        let output = self.run_docker(&args, None, Duration::from_secs(60)).await?;

        if !output.success() {
            anyhow::bail!(
                "failed to remove instance {}: {}",
                container_id,
                output.stderr.trim()
            );
        }

        Ok(())
    }
}

/// Classify a failed build/push from the tool's stderr.
pub fn classify_build_failure(stderr: &str) -> BuildError {
    let lower = stderr.to_lowercase();
    let detail = stderr.trim().to_string();

    if lower.contains("unauthorized")
        || lower.contains("authentication required")
        || lower.contains("denied: ")
    {
        return BuildError::RegistryAuth(detail);
    }

    if lower.contains("pull access denied")
        || lower.contains("manifest unknown")
        || lower.contains("failed to resolve source metadata")
        || lower.contains("no match for platform")
    {
        return BuildError::BaseImagePull(detail);
    }

    if lower.contains("could not find a version that satisfies")
        || lower.contains("no matching distribution found")
        || lower.contains("resolutionimpossible")
    {
        return BuildError::DependencyResolution(detail);
    }

    BuildError::Other(detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_auth_classification() {
        let err = classify_build_failure("denied: requested access to the resource is denied");
        assert!(matches!(err, BuildError::RegistryAuth(_)));

        let err = classify_build_failure("unauthorized: authentication required");
        assert!(matches!(err, BuildError::RegistryAuth(_)));
    }

    #[test]
    fn test_base_image_classification() {
        let err = classify_build_failure(
            "ERROR: failed to resolve source metadata for docker.io/library/python:3.13-slim",
        );
        assert!(matches!(err, BuildError::BaseImagePull(_)));
    }

    #[test]
    fn test_dependency_classification() {
        let err = classify_build_failure(
            "ERROR: Could not find a version that satisfies the requirement fastapi==999.0",
        );
        assert!(matches!(err, BuildError::DependencyResolution(_)));
    }

    #[test]
    fn test_unknown_failures_stay_generic() {
        let err = classify_build_failure("COPY failed: file not found");
        assert!(matches!(err, BuildError::Other(_)));
    }

    #[test]
    fn test_custom_binary_path() {
        let cli = DockerCli::with_binary_path("/usr/local/bin/podman");
        assert_eq!(cli.binary_path, "/usr/local/bin/podman");
    }
}
