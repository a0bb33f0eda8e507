//! Adapter interfaces for the external tools the pipeline drives.
//!
//! Adapters provide a unified seam between the engine and everything it
//! shells out to or calls over HTTP, so every component stays testable
//! with scripted fakes.

pub mod docker;
pub mod process;
pub mod sonar;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

pub use docker::{ContainerRuntime, DockerCli};
pub use process::ProcessExecutor;
pub use sonar::{AnalysisClient, GateStatus, SonarClient};

/// Captured result of one tool command
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Process exit code (-1 if terminated by signal)
    pub exit_code: i32,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,
}

impl ExecOutput {
    /// Whether the command reported success
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Trait for running external tool commands (linters, test runners)
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion, capturing its output.
    ///
    /// A non-zero exit is NOT an `Err`; callers decide what an exit code
    /// means. `Err` is reserved for spawn failures and timeouts.
    async fn run(&self, argv: &[String], timeout: Duration) -> Result<ExecOutput>;
}
