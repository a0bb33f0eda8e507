//! Static-analysis gate client for a SonarQube-style API.
//!
//! The scanner submits analyses out of band; this client only asks the
//! service for the gate verdict of a submission.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

/// Verdict reported by the analysis service for one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateStatus {
    /// Analysis still in progress, no verdict yet
    Pending,

    /// The submission passed the configured gate
    Passed,

    /// The submission was explicitly rejected
    Failed { reason: String },
}

/// Trait for fetching a gate verdict
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// One verdict fetch; `Pending` is a normal answer, not an error
    async fn gate_status(&self, analysis_id: &str) -> Result<GateStatus>;
}

/// HTTP client for a SonarQube-compatible `project_status` endpoint
pub struct SonarClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ProjectStatusResponse {
    #[serde(rename = "projectStatus")]
    project_status: ProjectStatus,
}

#[derive(Debug, Deserialize)]
struct ProjectStatus {
    status: String,
    #[serde(default)]
    conditions: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct Condition {
    #[serde(rename = "metricKey")]
    metric_key: String,
    status: String,
}

impl SonarClient {
    /// Create a new client for an analysis service
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, analysis_id: &str) -> String {
        format!(
            "{}/api/qualitygates/project_status?analysisId={}",
            self.base_url.trim_end_matches('/'),
            analysis_id
        )
    }
}

#[async_trait]
impl AnalysisClient for SonarClient {
    async fn gate_status(&self, analysis_id: &str) -> Result<GateStatus> {
        let mut request = self.client.get(self.api_url(analysis_id));
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .context("Failed to query the analysis service")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "analysis service returned HTTP {} for analysis {}",
                response.status().as_u16(),
                analysis_id
            );
        }

        let body: ProjectStatusResponse = response
            .json()
            .await
            .context("Failed to parse analysis service response")?;

        Ok(verdict_from(&body))
    }
}

fn verdict_from(body: &ProjectStatusResponse) -> GateStatus {
    match body.project_status.status.as_str() {
        "OK" => GateStatus::Passed,
        "ERROR" => {
            let failing: Vec<String> = body
                .project_status
                .conditions
                .iter()
                .filter(|c| c.status == "ERROR")
                .map(|c| c.metric_key.clone())
                .collect();

            let reason = if failing.is_empty() {
                "gate conditions not met".to_string()
            } else {
                format!("failing conditions: {}", failing.join(", "))
            };

            GateStatus::Failed { reason }
        }
        // NONE / IN_PROGRESS and anything unrecognized: no verdict yet
        _ => GateStatus::Pending,
    }
}
