//! beeline - Gated CI pipeline runner with deployment verification
//!
//! A Rust-based runner for the hivebox service's delivery pipeline:
//! lint and test stages gate a quality-gate poll, an image build and
//! publish, and a live smoke test against the deployed container.
//!
//! # Architecture
//!
//! The system is built around gated sequential stages:
//! - Stages run strictly in declared order; a failed required stage
//!   marks every later stage Skipped
//! - Every stage transition is recorded as an immutable event, so
//!   finished runs can be reconstructed and listed later
//! - Polling waits (quality gate, readiness probe) sleep between
//!   attempts and always carry an explicit ceiling
//!
//! # Modules
//!
//! - `adapters`: External tool seams (subprocess, docker CLI, analysis service)
//! - `core`: Orchestration logic (Pipeline, StageRunner, gate, builder, verifier)
//! - `domain`: Data structures (PipelineRun, RunEvent, Artifact, StageError)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Execute the pipeline for a push to main
//! beeline run --branch main --commit $(git rev-parse HEAD) --owner acme
//!
//! # Inspect a recorded run
//! beeline status <run-id>
//!
//! # Smoke-test an already-built image
//! beeline verify ghcr.io/acme/hivebox:abc123
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use crate::core::{
    DeploymentVerifier, Orchestrator, Pipeline, ProbeSpec, QualityGateEvaluator, StageRunner,
};
pub use crate::domain::{
    Artifact, OverallStatus, PipelineRun, RunEvent, StageError, StageStatus, TriggerContext,
    TriggerEvent,
};
