use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};
use crate::workflow::state::{Status, WorkflowState};

#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Persist a terminal state and return where it went.
    async fn store(&self, state: &WorkflowState) -> Result<String>;
}

/// Writes `recommendations_<ms>_<digest>.json` for every run and
/// `report_<ms>_<digest>.md` for completed ones.
pub struct FileReportSink {
    output_dir: PathBuf,
}

impl FileReportSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[async_trait]
impl ReportSink for FileReportSink {
    async fn store(&self, state: &WorkflowState) -> Result<String> {
        if !state.status().is_terminal() {
            return Err(AppError::Storage(format!(
                "Refusing to store a run in status {}",
                state.status()
            )));
        }

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| {
                AppError::Storage(format!("Cannot create {}: {e}", self.output_dir.display()))
            })?;

        let timestamp = state
            .finished_at
            .unwrap_or(state.started_at)
            .timestamp_millis();

        let json = serde_json::to_string_pretty(state)?;
        let json_path = self
            .output_dir
            .join(format!("recommendations_{timestamp}_{}.json", digest(&json)));
        write(&json_path, json.as_bytes()).await?;
        tracing::info!(path = %json_path.display(), "Wrote recommendations");

        let report = match (state.status(), state.final_report()) {
            (Status::Complete, Some(report)) => report,
            _ => return Ok(json_path.display().to_string()),
        };

        let report_path = self
            .output_dir
            .join(format!("report_{timestamp}_{}.md", digest(report)));
        write(&report_path, report.as_bytes()).await?;
        tracing::info!(path = %report_path.display(), "Wrote report");

        Ok(report_path.display().to_string())
    }
}

async fn write(path: &Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| AppError::Storage(format!("Cannot write {}: {e}", path.display())))
}

/// First 8 hex characters of the SHA-256 of `contents`.
fn digest(contents: &str) -> String {
    let hash = hex::encode(Sha256::digest(contents.as_bytes()));
    hash[..8].to_string()
}
