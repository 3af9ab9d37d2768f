//! Model artifact acquisition
//!
//! Streams a named artifact into the models directory, reporting floored
//! percentage progress per chunk. A previous file with the same name is
//! removed before the transfer starts, and a failed or cancelled transfer
//! never leaves a partial file behind.

pub mod catalog;
pub mod models;

pub use catalog::{resolve_url, ModelCatalog};
pub use models::{progress_percent, CatalogEntry, DownloadState, DownloadTask};

use crate::error::{AssistError, Result};
use crate::metrics::METRICS;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

struct TaskEntry {
    task: DownloadTask,
    cancel: CancellationToken,
}

/// Downloads model artifacts, one active transfer per artifact name
pub struct ModelDownloader {
    client: Client,
    models_dir: PathBuf,
    tasks: DashMap<String, TaskEntry>,
}

impl ModelDownloader {
    pub fn new(models_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AssistError::DownloadFailed(e.to_string()))?;

        Ok(Self {
            client,
            models_dir: models_dir.into(),
            tasks: DashMap::new(),
        })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Where an artifact is stored once downloaded
    pub fn destination_for(&self, artifact_name: &str) -> PathBuf {
        self.models_dir.join(artifact_name)
    }

    /// Download `source_url` into the models directory as `artifact_name`
    ///
    /// `on_progress` receives the floored completion percentage after every
    /// chunk (0 while the size is unknown). No retry is attempted.
    pub async fn download<F>(
        &self,
        artifact_name: &str,
        source_url: &str,
        mut on_progress: F,
    ) -> Result<PathBuf>
    where
        F: FnMut(u8) + Send,
    {
        validate_artifact_name(artifact_name)?;
        validate_source_url(source_url)?;

        let destination = self.destination_for(artifact_name);
        let cancel = CancellationToken::new();

        match self.tasks.entry(artifact_name.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().task.state.is_running() {
                    warn!("Rejected second download of {}", artifact_name);
                    return Err(AssistError::DownloadInProgress(artifact_name.to_string()));
                }
                occupied.insert(TaskEntry {
                    task: DownloadTask::new(artifact_name, source_url, destination.clone()),
                    cancel: cancel.clone(),
                });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(TaskEntry {
                    task: DownloadTask::new(artifact_name, source_url, destination.clone()),
                    cancel: cancel.clone(),
                });
            }
        }

        let mut guard = TransferGuard {
            tasks: &self.tasks,
            name: artifact_name,
            destination: &destination,
            armed: true,
        };

        info!("Downloading {} from {}", artifact_name, source_url);
        let start = Instant::now();
        let result = self
            .transfer(artifact_name, source_url, &destination, &cancel, &mut on_progress)
            .await;
        let elapsed = start.elapsed().as_secs_f64();

        let result = match result {
            Ok(bytes) => {
                self.finish(artifact_name, DownloadState::Complete, None);
                METRICS.record_download(DownloadState::Complete.as_str(), elapsed);
                info!("Downloaded {} ({} bytes) to {}", artifact_name, bytes, destination.display());
                Ok(destination.clone())
            }
            Err(e) => {
                remove_partial(&destination).await;
                let state = match &e {
                    AssistError::DownloadCancelled(_) => DownloadState::Cancelled,
                    _ => DownloadState::Failed,
                };
                self.finish(artifact_name, state, Some(e.to_string()));
                METRICS.record_download(state.as_str(), elapsed);
                match state {
                    DownloadState::Cancelled => info!("Download of {} cancelled", artifact_name),
                    _ => error!("Download of {} failed: {}", artifact_name, e),
                }
                Err(e)
            }
        };

        guard.armed = false;
        result
    }

    /// Signal an active transfer to stop
    ///
    /// Returns false when no transfer for `artifact_name` is running.
    pub fn cancel(&self, artifact_name: &str) -> bool {
        match self.tasks.get(artifact_name) {
            Some(entry) if entry.task.state.is_running() => {
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Snapshot of the latest task for `artifact_name`
    pub fn task(&self, artifact_name: &str) -> Option<DownloadTask> {
        self.tasks.get(artifact_name).map(|entry| entry.task.clone())
    }

    async fn transfer<F>(
        &self,
        artifact_name: &str,
        source_url: &str,
        destination: &Path,
        cancel: &CancellationToken,
        on_progress: &mut F,
    ) -> Result<u64>
    where
        F: FnMut(u8) + Send,
    {
        tokio::fs::create_dir_all(&self.models_dir).await?;

        match tokio::fs::remove_file(destination).await {
            Ok(()) => info!("Removed existing artifact at {}", destination.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.update(artifact_name, |task| task.state = DownloadState::Active);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(AssistError::DownloadCancelled(artifact_name.to_string()));
            }
            response = self.client.get(source_url).send() => {
                response.map_err(|e| AssistError::DownloadFailed(e.to_string()))?
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AssistError::DownloadFailed(format!(
                "unexpected status {} from {}",
                status, source_url
            )));
        }

        let expected = response.content_length();
        self.update(artifact_name, |task| task.bytes_expected = expected);
        debug!("Expecting {:?} bytes for {}", expected, artifact_name);

        let mut file = tokio::fs::File::create(destination).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(AssistError::DownloadCancelled(artifact_name.to_string()));
                }
                next = stream.next() => next,
            };

            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| AssistError::DownloadFailed(e.to_string()))?;

            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            self.update(artifact_name, |task| task.bytes_written = written);

            on_progress(progress_percent(written, expected));

            if cancel.is_cancelled() {
                return Err(AssistError::DownloadCancelled(artifact_name.to_string()));
            }
        }

        file.flush().await?;
        drop(file);

        if let Some(expected) = expected {
            if written != expected {
                return Err(AssistError::DownloadFailed(format!(
                    "incomplete transfer: {} of {} bytes",
                    written, expected
                )));
            }
        }

        Ok(written)
    }

    fn update(&self, artifact_name: &str, f: impl FnOnce(&mut DownloadTask)) {
        if let Some(mut entry) = self.tasks.get_mut(artifact_name) {
            f(&mut entry.task);
        }
    }

    fn finish(&self, artifact_name: &str, state: DownloadState, error: Option<String>) {
        self.update(artifact_name, |task| {
            task.state = state;
            task.finished_at = Some(Utc::now());
            task.error = error;
        });
    }
}

/// Cleans up when a download future is dropped mid-transfer
struct TransferGuard<'a> {
    tasks: &'a DashMap<String, TaskEntry>,
    name: &'a str,
    destination: &'a Path,
    armed: bool,
}

impl Drop for TransferGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = std::fs::remove_file(self.destination) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove partial artifact {}: {}", self.destination.display(), e);
            }
        }
        if let Some(mut entry) = self.tasks.get_mut(self.name) {
            entry.task.state = DownloadState::Cancelled;
            entry.task.finished_at = Some(Utc::now());
        }
    }
}

async fn remove_partial(destination: &Path) {
    match tokio::fs::remove_file(destination).await {
        Ok(()) => debug!("Removed partial artifact {}", destination.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial artifact {}: {}", destination.display(), e),
    }
}

fn validate_artifact_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AssistError::InvalidArgument("artifact name is empty".to_string()));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(AssistError::InvalidArgument(format!(
            "artifact name must be a plain file name: {}",
            name
        )));
    }
    Ok(())
}

fn validate_source_url(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(AssistError::InvalidArgument("source url is empty".to_string()));
    }
    reqwest::Url::parse(url)
        .map_err(|e| AssistError::InvalidArgument(format!("invalid source url {}: {}", url, e)))?;
    Ok(())
}
