//! Model hub catalog lookups

use super::models::CatalogEntry;
use crate::error::{AssistError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const CATALOG_TIMEOUT: Duration = Duration::from_secs(60);

/// Direct download URL of a file in a hub repository
pub fn resolve_url(hub_url: &str, repo_id: &str, file_name: &str) -> String {
    format!(
        "{}/{}/resolve/main/{}",
        hub_url.trim_end_matches('/'),
        repo_id,
        file_name
    )
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    siblings: Vec<RepoFile>,
}

#[derive(Debug, Deserialize)]
struct RepoFile {
    rfilename: String,
}

/// Lists the GGUF artifacts a hub repository publishes
pub struct ModelCatalog {
    client: Client,
    hub_url: String,
}

impl ModelCatalog {
    pub fn new(hub_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(CATALOG_TIMEOUT)
            .build()
            .map_err(|e| AssistError::DownloadFailed(e.to_string()))?;

        Ok(Self {
            client,
            hub_url: hub_url.into(),
        })
    }

    /// `.gguf` files in `repo_id`, in the order the hub lists them
    pub async fn list_gguf(&self, repo_id: &str) -> Result<Vec<CatalogEntry>> {
        if repo_id.trim().is_empty() {
            return Err(AssistError::InvalidArgument("repository id is empty".to_string()));
        }

        let url = format!("{}/api/models/{}", self.hub_url.trim_end_matches('/'), repo_id);
        debug!("Listing model files from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AssistError::DownloadFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistError::DownloadFailed(format!(
                "catalog request for {} returned {}",
                repo_id, status
            )));
        }

        let info: RepoInfo = response
            .json()
            .await
            .map_err(|e| AssistError::DownloadFailed(format!("invalid catalog response: {}", e)))?;

        Ok(info
            .siblings
            .into_iter()
            .filter(|f| f.rfilename.ends_with(".gguf"))
            .map(|f| CatalogEntry {
                source_url: resolve_url(&self.hub_url, repo_id, &f.rfilename),
                file_name: f.rfilename,
            })
            .collect())
    }
}
