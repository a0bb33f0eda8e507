//! Per-run JSONL event log and report artifacts.
//!
//! Each run gets its own directory under the runs base: a `run.json`
//! header written at trigger time, an append-only `events.jsonl`, and
//! the human-readable `summary.txt` report.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{RunEvent, RunHeader};

/// File-based run log using JSONL for events
pub struct RunLog {
    /// Directory containing this run
    run_dir: PathBuf,

    /// Path to the events.jsonl file
    events_path: PathBuf,
}

impl RunLog {
    /// Create or open the log for a run under a base directory
    pub async fn open(base_dir: &Path, run_id: Uuid) -> Result<Self> {
        let run_dir = base_dir.join(run_id.to_string());

        fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("Failed to create run directory: {}", run_dir.display()))?;

        let events_path = run_dir.join("events.jsonl");

        Ok(Self {
            run_dir,
            events_path,
        })
    }

    /// Get the run directory
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Persist the run header (written once at trigger time)
    pub async fn write_header(&self, header: &RunHeader) -> Result<()> {
        let path = self.run_dir.join("run.json");
        let json = serde_json::to_string_pretty(header).context("Failed to serialize run header")?;

        fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write run header: {}", path.display()))?;

        Ok(())
    }

    /// Load the run header
    pub async fn read_header(&self) -> Result<RunHeader> {
        let path = self.run_dir.join("run.json");
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read run header: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse run header")
    }

    /// Append an event to the log
    pub async fn append(&self, event: &RunEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| {
                format!("Failed to open events file: {}", self.events_path.display())
            })?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<RunEvent>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.events_path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: RunEvent = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Store the human-readable run summary
    pub async fn store_summary(&self, content: &str) -> Result<PathBuf> {
        let path = self.run_dir.join("summary.txt");

        fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write summary: {}", path.display()))?;

        Ok(path)
    }

    /// List all run IDs under a base directory
    pub async fn list_runs(base_dir: &Path) -> Result<Vec<Uuid>> {
        if !base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = fs::read_dir(base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        runs.push(uuid);
                    }
                }
            }
        }

        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventKind, TriggerContext, TriggerEvent};
    use chrono::Utc;
    use tempfile::TempDir;

    async fn open_log() -> (RunLog, Uuid, TempDir) {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        let log = RunLog::open(temp.path(), run_id).await.unwrap();
        (log, run_id, temp)
    }

    #[tokio::test]
    async fn test_append_and_replay_order() {
        let (log, run_id, _temp) = open_log().await;

        for stage in ["lint", "test", "build"] {
            let event = RunEvent::new(
                run_id,
                Some(stage.to_string()),
                EventKind::StagePassed,
                format!("Stage '{}' passed", stage),
            );
            log.append(&event).await.unwrap();
        }

        let events = log.replay().await.unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].stage.as_deref(), Some("lint"));
        assert_eq!(events[2].stage.as_deref(), Some("build"));
    }

    #[tokio::test]
    async fn test_header_round_trip() {
        let (log, run_id, _temp) = open_log().await;

        let header = RunHeader {
            id: run_id,
            pipeline_name: "hivebox".to_string(),
            trigger: TriggerContext {
                event: TriggerEvent::Push,
                branch: "main".to_string(),
                commit_sha: "abc123".to_string(),
                owner: "acme".to_string(),
                repository: "hivebox".to_string(),
            },
            started_at: Utc::now(),
        };

        log.write_header(&header).await.unwrap();
        let loaded = log.read_header().await.unwrap();

        assert_eq!(loaded.id, run_id);
        assert_eq!(loaded.pipeline_name, "hivebox");
        assert_eq!(loaded.trigger.commit_sha, "abc123");
    }

    #[tokio::test]
    async fn test_summary_written_into_run_dir() {
        let (log, _run_id, _temp) = open_log().await;

        let path = log.store_summary("overall: passed\n").await.unwrap();

        assert!(path.starts_with(log.run_dir()));
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.contains("passed"));
    }

    #[tokio::test]
    async fn test_list_runs_ignores_foreign_dirs() {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        let _log = RunLog::open(temp.path(), run_id).await.unwrap();
        std::fs::create_dir(temp.path().join("not-a-run")).unwrap();

        let runs = RunLog::list_runs(temp.path()).await.unwrap();

        assert_eq!(runs, vec![run_id]);
    }
}
