//! Pipeline definitions and loading.
//!
//! Pipelines are defined in YAML: an ordered list of command stages plus
//! configuration blocks for the built-in quality gate, image build,
//! publish, and deployment verification stages.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A complete pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline name (used in CLI and run records)
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Protected branch that push/pull-request triggers must target
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Default per-stage timeout in seconds
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_seconds: u64,

    /// Ordered command stages run before the built-in stages
    pub stages: Vec<StageSpec>,

    /// Quality gate polling configuration
    pub quality_gate: GateConfig,

    /// Image build and publish configuration
    pub build: BuildConfig,

    /// Readiness probe for deployment verification
    pub probe: ProbeSpec,
}

fn default_branch() -> String {
    "main".to_string()
}
fn default_stage_timeout() -> u64 {
    600
}

impl Pipeline {
    /// Load a pipeline from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse a pipeline from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse pipeline YAML")
    }

    /// Validate the pipeline definition
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("Pipeline name cannot be empty");
        }

        if self.branch.is_empty() {
            anyhow::bail!("Pipeline branch cannot be empty");
        }

        if self.stages.is_empty() {
            anyhow::bail!("Pipeline must have at least one command stage");
        }

        let mut seen: Vec<&str> = Vec::new();
        for (i, stage) in self.stages.iter().enumerate() {
            if stage.name.is_empty() {
                anyhow::bail!("Stage {} has an empty name", i);
            }
            if seen.contains(&stage.name.as_str()) {
                anyhow::bail!("Duplicate stage name '{}'", stage.name);
            }
            seen.push(&stage.name);

            if stage.commands.is_empty() {
                anyhow::bail!("Stage '{}' has no commands", stage.name);
            }
            for command in &stage.commands {
                if command.is_empty() {
                    anyhow::bail!("Stage '{}' contains an empty command", stage.name);
                }
            }
        }

        if self.build.registry.is_empty() {
            anyhow::bail!("Build registry cannot be empty");
        }
        if self.build.service.is_empty() {
            anyhow::bail!("Build service name cannot be empty");
        }
        if self.probe.expected_body.is_empty() {
            anyhow::bail!("Probe expected body cannot be empty");
        }

        Ok(())
    }

    /// Get a command stage by name
    pub fn get_stage(&self, name: &str) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// The built-in pipeline for the hivebox service.
    ///
    /// The narrow syntax/undefined-name lint subset is blocking; the
    /// broader style pass is advisory and never blocks downstream stages.
    pub fn hivebox() -> Self {
        Self {
            name: "hivebox".to_string(),
            description: "Lint, test, gate, build, publish, and verify the hivebox service"
                .to_string(),
            branch: default_branch(),
            stage_timeout_seconds: default_stage_timeout(),
            stages: vec![
                StageSpec {
                    name: "lint".to_string(),
                    commands: vec![vec![
                        "flake8".to_string(),
                        ".".to_string(),
                        "--count".to_string(),
                        "--select=E9,F63,F7,F82".to_string(),
                        "--show-source".to_string(),
                        "--statistics".to_string(),
                    ]],
                    required: true,
                    timeout_seconds: None,
                },
                StageSpec {
                    name: "lint-style".to_string(),
                    commands: vec![vec![
                        "pylint".to_string(),
                        "app".to_string(),
                        "main.py".to_string(),
                    ]],
                    required: false,
                    timeout_seconds: None,
                },
                StageSpec {
                    name: "test".to_string(),
                    commands: vec![vec![
                        "pytest".to_string(),
                        "--cov=app".to_string(),
                        "--cov-report=term".to_string(),
                        "--junitxml=report.xml".to_string(),
                    ]],
                    required: true,
                    timeout_seconds: None,
                },
            ],
            quality_gate: GateConfig::default(),
            build: BuildConfig {
                context: PathBuf::from("."),
                dockerfile: PathBuf::from("Dockerfile"),
                registry: "ghcr.io".to_string(),
                service: "hivebox".to_string(),
                port: 8000,
            },
            probe: ProbeSpec::default(),
        }
    }
}

/// A single command stage in a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    /// Stage name (unique within the pipeline)
    pub name: String,

    /// Commands to run in order; the stage fails on the first non-zero exit
    pub commands: Vec<Vec<String>>,

    /// Whether a failure halts all downstream stages
    #[serde(default = "default_required")]
    pub required: bool,

    /// Override timeout for this stage (uses the pipeline default if not set)
    pub timeout_seconds: Option<u64>,
}

fn default_required() -> bool {
    true
}

impl StageSpec {
    /// Get the effective timeout for this stage
    pub fn timeout(&self, default_seconds: u64) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(default_seconds))
    }
}

/// Quality gate polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Analysis service base URL
    #[serde(default = "default_gate_url")]
    pub base_url: String,

    /// Seconds between verdict polls
    #[serde(default = "default_gate_interval")]
    pub poll_interval_seconds: u64,

    /// Ceiling for the whole wait; exceeding it is GateTimeout
    #[serde(default = "default_gate_timeout")]
    pub timeout_seconds: u64,
}

fn default_gate_url() -> String {
    "https://sonarcloud.io".to_string()
}
fn default_gate_interval() -> u64 {
    5
}
fn default_gate_timeout() -> u64 {
    600
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            base_url: default_gate_url(),
            poll_interval_seconds: default_gate_interval(),
            timeout_seconds: default_gate_timeout(),
        }
    }
}

impl GateConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Image build and publish configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build context directory
    #[serde(default = "default_context")]
    pub context: PathBuf,

    /// Dockerfile path, relative to the context
    #[serde(default = "default_dockerfile")]
    pub dockerfile: PathBuf,

    /// Registry host the artifact is published to
    pub registry: String,

    /// Service (image) name
    pub service: String,

    /// Port the runtime image listens on; also used as the fixed host
    /// port during verification
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_context() -> PathBuf {
    PathBuf::from(".")
}
fn default_dockerfile() -> PathBuf {
    PathBuf::from("Dockerfile")
}
fn default_port() -> u16 {
    8000
}

/// Readiness probe for deployment verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSpec {
    /// URL polled until it returns the expected status code
    #[serde(default = "default_probe_url")]
    pub target_url: String,

    /// Status code that means "ready"
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,

    /// Exact body the ready service must return
    pub expected_body: String,

    /// Seconds between polls
    #[serde(default = "default_probe_interval")]
    pub interval_seconds: u64,

    /// Ceiling for the whole wait; exceeding it is ProbeTimeout
    #[serde(default = "default_probe_timeout")]
    pub timeout_seconds: u64,
}

fn default_probe_url() -> String {
    "http://127.0.0.1:8000/version".to_string()
}
fn default_expected_status() -> u16 {
    200
}
fn default_probe_interval() -> u64 {
    5
}
fn default_probe_timeout() -> u64 {
    60
}

impl Default for ProbeSpec {
    fn default() -> Self {
        Self {
            target_url: default_probe_url(),
            expected_status: default_expected_status(),
            expected_body: "\"0.0.1\"".to_string(),
            interval_seconds: default_probe_interval(),
            timeout_seconds: default_probe_timeout(),
        }
    }
}

impl ProbeSpec {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PIPELINE_YAML: &str = r#"
name: hivebox
description: Test pipeline
branch: main

stages:
  - name: lint
    commands:
      - [flake8, ".", "--select=E9,F63,F7,F82"]

  - name: lint-style
    required: false
    commands:
      - [pylint, app, main.py]

  - name: test
    commands:
      - [pytest, "--cov=app"]
    timeout_seconds: 120

quality_gate:
  base_url: https://sonarcloud.io
  timeout_seconds: 600

build:
  registry: ghcr.io
  service: hivebox

probe:
  expected_body: "\"0.0.1\""
"#;

    #[test]
    fn test_pipeline_parsing() {
        let pipeline = Pipeline::from_yaml(TEST_PIPELINE_YAML).unwrap();

        assert_eq!(pipeline.name, "hivebox");
        assert_eq!(pipeline.stages.len(), 3);
        assert_eq!(pipeline.branch, "main");
        assert_eq!(pipeline.build.port, 8000);
        assert_eq!(pipeline.probe.expected_status, 200);
    }

    #[test]
    fn test_pipeline_validation() {
        let pipeline = Pipeline::from_yaml(TEST_PIPELINE_YAML).unwrap();
        assert!(pipeline.validate().is_ok());
    }

    #[test]
    fn test_required_defaults_to_true() {
        let pipeline = Pipeline::from_yaml(TEST_PIPELINE_YAML).unwrap();

        assert!(pipeline.get_stage("lint").unwrap().required);
        assert!(!pipeline.get_stage("lint-style").unwrap().required);
    }

    #[test]
    fn test_stage_timeout_override() {
        let pipeline = Pipeline::from_yaml(TEST_PIPELINE_YAML).unwrap();

        let test_stage = pipeline.get_stage("test").unwrap();
        assert_eq!(
            test_stage.timeout(pipeline.stage_timeout_seconds),
            Duration::from_secs(120)
        );

        let lint_stage = pipeline.get_stage("lint").unwrap();
        assert_eq!(
            lint_stage.timeout(pipeline.stage_timeout_seconds),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn test_duplicate_stage_names_rejected() {
        let yaml = r#"
name: invalid
description: duplicate stages
stages:
  - name: lint
    commands: [[flake8]]
  - name: lint
    commands: [[pylint]]
quality_gate: {}
build:
  registry: ghcr.io
  service: hivebox
probe:
  expected_body: "\"0.0.1\""
"#;
        let pipeline = Pipeline::from_yaml(yaml).unwrap();
        assert!(pipeline.validate().is_err());
    }

    #[test]
    fn test_empty_command_rejected() {
        let yaml = r#"
name: invalid
description: empty command
stages:
  - name: lint
    commands: [[]]
quality_gate: {}
build:
  registry: ghcr.io
  service: hivebox
probe:
  expected_body: "\"0.0.1\""
"#;
        let pipeline = Pipeline::from_yaml(yaml).unwrap();
        assert!(pipeline.validate().is_err());
    }

    #[test]
    fn test_builtin_hivebox_pipeline() {
        let pipeline = Pipeline::hivebox();

        assert!(pipeline.validate().is_ok());
        assert_eq!(pipeline.stages.len(), 3);
        assert!(pipeline.get_stage("lint").unwrap().required);
        assert!(!pipeline.get_stage("lint-style").unwrap().required);
        assert!(pipeline.get_stage("test").unwrap().required);
        assert_eq!(pipeline.probe.expected_body, "\"0.0.1\"");
        assert_eq!(pipeline.quality_gate.timeout_seconds, 600);
    }
}
