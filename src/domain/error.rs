//! Error taxonomy for pipeline stages.
//!
//! Each failure kind stays distinct so an operator can tell "code is
//! broken" from "artifact could not be produced" from "deployment never
//! came up".

use thiserror::Error;

/// Terminal failure of a pipeline stage
#[derive(Debug, Error)]
pub enum StageError {
    /// A tool command returned a non-success outcome
    #[error("command `{command}` exited with code {code}")]
    StageFailure { command: String, code: i32 },

    /// The analysis service explicitly rejected the submission
    #[error("quality gate rejected the analysis: {reason}")]
    GateFailed { reason: String },

    /// The analysis service never returned a terminal verdict in time
    #[error("no quality gate verdict within {timeout_seconds}s")]
    GateTimeout { timeout_seconds: u64 },

    /// The artifact could not be produced or published
    #[error(transparent)]
    Build(#[from] BuildError),

    /// The deployed service never matched the expected status code in time
    #[error("service never became ready within {timeout_seconds}s")]
    ProbeTimeout { timeout_seconds: u64 },

    /// The service became ready but its response contract did not match
    #[error("unexpected probe body: expected {expected}, got {actual}")]
    UnexpectedBody { expected: String, actual: String },

    /// Anything the taxonomy above does not cover
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageError {
    /// Short label used in status records and summaries
    pub fn label(&self) -> &'static str {
        match self {
            StageError::StageFailure { .. } => "stage-failure",
            StageError::GateFailed { .. } => "gate-failed",
            StageError::GateTimeout { .. } => "gate-timeout",
            StageError::Build(e) => e.label(),
            StageError::ProbeTimeout { .. } => "probe-timeout",
            StageError::UnexpectedBody { .. } => "unexpected-body",
            StageError::Other(_) => "error",
        }
    }
}

/// Why an image build or publish failed
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("dependency resolution failed: {0}")]
    DependencyResolution(String),

    #[error("base image pull failed: {0}")]
    BaseImagePull(String),

    #[error("registry authentication failed: {0}")]
    RegistryAuth(String),

    #[error("runtime image runs as a privileged user ({user})")]
    RootUser { user: String },

    #[error("build failed: {0}")]
    Other(String),
}

impl BuildError {
    pub fn label(&self) -> &'static str {
        match self {
            BuildError::DependencyResolution(_) => "build-dependency-resolution",
            BuildError::BaseImagePull(_) => "build-base-image-pull",
            BuildError::RegistryAuth(_) => "build-registry-auth",
            BuildError::RootUser { .. } => "build-root-user",
            BuildError::Other(_) => "build-failed",
        }
    }
}
