//! Command-line interface for beeline.
//!
//! Provides commands for executing pipeline runs, inspecting recorded
//! runs, verifying an already-built image, and debugging configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use crate::adapters::DockerCli;
use crate::config;
use crate::core::orchestrator::{exit_code, first_problem};
use crate::core::{DeploymentVerifier, Orchestrator, Pipeline, ProbeSpec};
use crate::domain::{Artifact, StageStatus, TriggerContext, TriggerEvent};

/// beeline - Gated CI pipeline runner with deployment verification
#[derive(Parser, Debug)]
#[command(name = "beeline")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute the pipeline for a trigger
    Run {
        /// Repository event that triggered this run
        #[arg(long, value_enum, default_value = "push")]
        event: EventArg,

        /// Branch the event targets
        #[arg(long, default_value = "main")]
        branch: String,

        /// Commit sha (a content fingerprint is derived if omitted)
        #[arg(long)]
        commit: Option<String>,

        /// Repository owner (falls back to configuration)
        #[arg(long)]
        owner: Option<String>,

        /// Repository name
        #[arg(long, default_value = "hivebox")]
        repository: String,

        /// Pipeline definition file (uses the built-in hivebox pipeline
        /// if not provided)
        #[arg(short, long)]
        pipeline: Option<PathBuf>,
    },

    /// Show a recorded run
    Status {
        /// Run ID (UUID)
        run_id: String,
    },

    /// List recent recorded runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Verify an already-built image against the readiness probe
    Verify {
        /// Image reference to run
        image: String,

        /// Probe URL
        #[arg(long, default_value = "http://127.0.0.1:8000/version")]
        url: String,

        /// Expected response body
        #[arg(long, default_value = "\"0.0.1\"")]
        expected_body: String,

        /// Host/container port for the instance
        #[arg(long, default_value = "8000")]
        port: u16,

        /// Seconds between polls
        #[arg(long, default_value = "5")]
        interval: u64,

        /// Overall probe ceiling in seconds
        #[arg(long, default_value = "60")]
        timeout: u64,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Trigger event for CLI (maps to TriggerEvent)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EventArg {
    /// Push to a branch
    Push,

    /// Pull request targeting a branch
    PullRequest,
}

impl From<EventArg> for TriggerEvent {
    fn from(e: EventArg) -> Self {
        match e {
            EventArg::Push => TriggerEvent::Push,
            EventArg::PullRequest => TriggerEvent::PullRequest,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                event,
                branch,
                commit,
                owner,
                repository,
                pipeline,
            } => run_pipeline(event, branch, commit, owner, repository, pipeline).await,
            Commands::Status { run_id } => show_status(&run_id).await,
            Commands::Runs { limit } => list_runs(limit).await,
            Commands::Verify {
                image,
                url,
                expected_body,
                port,
                interval,
                timeout,
            } => verify_image(&image, url, expected_body, port, interval, timeout).await,
            Commands::Config => show_config(),
        }
    }
}

/// Execute the pipeline for a trigger
async fn run_pipeline(
    event: EventArg,
    branch: String,
    commit: Option<String>,
    owner: Option<String>,
    repository: String,
    pipeline_file: Option<PathBuf>,
) -> Result<()> {
    let cfg = config::config()?;

    let pipeline = match pipeline_file {
        Some(path) => Pipeline::from_file(&path)?,
        None => Pipeline::hivebox(),
    };
    pipeline.validate()?;

    let owner = owner.unwrap_or_else(|| cfg.owner.clone());
    if owner.is_empty() {
        anyhow::bail!(
            "No repository owner. Use --owner or set BEELINE_OWNER / registry.owner in config"
        );
    }

    let trigger = TriggerContext {
        event: event.into(),
        branch,
        commit_sha: commit.unwrap_or_default(),
        owner,
        repository,
    };

    let orchestrator = Orchestrator::from_config(&cfg);
    let run = orchestrator.execute(&pipeline, trigger).await?;

    print_run(&run);

    if run.is_passed() {
        eprintln!("\n[Run {} passed]", run.id);
    } else {
        if let Some(problem) = first_problem(&run) {
            eprintln!("\n[Run {} failed: {}]", run.id, problem);
        } else {
            eprintln!("\n[Run {} failed]", run.id);
        }
        std::process::exit(exit_code(&run));
    }

    Ok(())
}

/// Show the status of a recorded run
async fn show_status(run_id_str: &str) -> Result<()> {
    let run_id = Uuid::parse_str(run_id_str)
        .with_context(|| format!("Invalid run ID: {}", run_id_str))?;

    let cfg = config::config()?;
    let orchestrator = Orchestrator::from_config(&cfg);
    let run = orchestrator.get_run(run_id).await?;

    println!("Run ID: {}", run.id);
    println!("Pipeline: {}", run.pipeline_name);
    println!(
        "Trigger: {} {} @ {}",
        run.trigger.event, run.trigger.branch, run.trigger.commit_sha
    );
    println!("Overall: {:?}", run.overall);
    println!("Started: {}", run.started_at);
    if let Some(completed) = run.completed_at {
        println!("Completed: {}", completed);
    }
    println!();
    print_run(&run);

    Ok(())
}

/// List recent recorded runs
async fn list_runs(limit: usize) -> Result<()> {
    let cfg = config::config()?;
    let orchestrator = Orchestrator::from_config(&cfg);
    let runs = orchestrator.list_runs(limit).await?;

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!("{:<38} {:<12} {:<10} {:<10}", "RUN ID", "PIPELINE", "BRANCH", "OVERALL");
    println!("{}", "-".repeat(74));

    for run in runs {
        println!(
            "{:<38} {:<12} {:<10} {:<10}",
            run.id,
            run.pipeline_name,
            run.trigger.branch,
            format!("{:?}", run.overall).to_lowercase()
        );
    }

    Ok(())
}

/// Verify an already-built image against the readiness probe
async fn verify_image(
    image: &str,
    url: String,
    expected_body: String,
    port: u16,
    interval: u64,
    timeout: u64,
) -> Result<()> {
    let probe = ProbeSpec {
        target_url: url,
        expected_status: 200,
        expected_body,
        interval_seconds: interval,
        timeout_seconds: timeout,
    };

    let artifact = Artifact::new(image);
    let verifier = DeploymentVerifier::new(Arc::new(DockerCli::new()));

    match verifier.verify(&artifact, &probe, port, port).await {
        Ok(()) => {
            println!("Verified: {} matches the readiness contract", image);
            Ok(())
        }
        Err(e) => {
            eprintln!("Verification failed ({}): {}", e.label(), e);
            std::process::exit(1);
        }
    }
}

/// Show the resolved configuration (for debugging)
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("beeline configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:  {}", cfg.home.display());
    println!("  Runs:  {}", cfg.runs_dir().display());
    println!();
    println!("Registry:");
    println!("  Host:  {}", cfg.registry_host);
    println!(
        "  Owner: {}",
        if cfg.owner.is_empty() { "(unset)" } else { &cfg.owner }
    );
    println!(
        "  Token: {}",
        if cfg.registry_token.is_some() { "(set)" } else { "(unset)" }
    );
    println!();
    println!("Analysis service:");
    println!("  URL:   {}", cfg.analysis_base_url);
    println!(
        "  Token: {}",
        if cfg.analysis_token.is_some() { "(set)" } else { "(unset)" }
    );

    Ok(())
}

/// Print per-stage records as a table
fn print_run(run: &crate::domain::PipelineRun) {
    println!("{:<14} {:<9} {:<10}", "STAGE", "STATUS", "DURATION");
    println!("{}", "-".repeat(36));

    for record in &run.records {
        let duration = record
            .duration_ms
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<14} {:<9} {:<10}",
            record.name,
            format!("{:?}", record.status).to_lowercase(),
            duration
        );
        if record.status == StageStatus::Failed {
            if let Some(ref reason) = record.reason {
                println!("  └─ {}", reason);
            }
        }
    }
}
