//! Download task models

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Lifecycle of one artifact transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadState {
    Pending,
    Active,
    Complete,
    Failed,
    Cancelled,
}

impl DownloadState {
    /// Pending and active tasks block a second download of the same name
    pub fn is_running(&self) -> bool {
        matches!(self, DownloadState::Pending | DownloadState::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadState::Pending => "pending",
            DownloadState::Active => "active",
            DownloadState::Complete => "complete",
            DownloadState::Failed => "failed",
            DownloadState::Cancelled => "cancelled",
        }
    }
}

/// Snapshot of a transfer
#[derive(Debug, Clone, Serialize)]
pub struct DownloadTask {
    pub artifact_name: String,
    pub source_url: String,
    pub destination_path: PathBuf,
    pub bytes_written: u64,
    /// Unknown until the response headers arrive
    pub bytes_expected: Option<u64>,
    pub state: DownloadState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure reason for failed tasks
    pub error: Option<String>,
}

impl DownloadTask {
    pub fn new(artifact_name: &str, source_url: &str, destination_path: PathBuf) -> Self {
        Self {
            artifact_name: artifact_name.to_string(),
            source_url: source_url.to_string(),
            destination_path,
            bytes_written: 0,
            bytes_expected: None,
            state: DownloadState::Pending,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    /// Floored percentage, 0 while the expected size is unknown
    pub fn percent(&self) -> u8 {
        progress_percent(self.bytes_written, self.bytes_expected)
    }
}

/// `floor(written / expected * 100)`, clamped to 100
pub fn progress_percent(written: u64, expected: Option<u64>) -> u8 {
    match expected {
        Some(total) if total > 0 => (written.saturating_mul(100) / total).min(100) as u8,
        _ => 0,
    }
}

/// A GGUF file published in a hub repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub file_name: String,
    pub source_url: String,
}
