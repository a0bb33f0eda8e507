//! Subprocess executor for stage commands.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use super::{CommandExecutor, ExecOutput};

/// Runs stage commands as local subprocesses
#[derive(Debug, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(&self, argv: &[String], command_timeout: Duration) -> Result<ExecOutput> {
        let (program, args) = argv
            .split_first()
            .context("Stage command is empty")?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn command `{}`", program))?;

        // Wait for completion with timeout
        let output = timeout(command_timeout, child.wait_with_output())
            .await
            .with_context(|| {
                format!(
                    "Command `{}` timed out after {:?}",
                    program, command_timeout
                )
            })?
            .with_context(|| format!("Failed to wait for command `{}`", program))?;

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
