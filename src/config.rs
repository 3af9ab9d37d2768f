//! Layered configuration: defaults, optional TOML file, `ASSIST__*` environment

use crate::error::Result;
use secrecy::SecretString;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment prefix; sections are separated by `__`, e.g. `ASSIST__REMOTE__ENDPOINT`
pub const ENV_PREFIX: &str = "ASSIST";

/// Top-level configuration
#[derive(Debug, Default, Deserialize)]
pub struct AssistConfig {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub connectivity: ConnectivityConfig,

    #[serde(default)]
    pub corpus: CorpusConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AssistConfig {
    /// Load configuration from an optional file plus the environment
    ///
    /// `.env` is read first so that its values participate in the
    /// environment layer.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: AssistConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }
}

/// Remote inference endpoint
#[derive(Deserialize)]
pub struct RemoteConfig {
    /// Enable/disable the online path entirely
    #[serde(default = "default_remote_enabled")]
    pub enabled: bool,

    /// POST endpoint accepting `{prompt}` and returning `{response}`
    #[serde(default = "default_remote_endpoint")]
    pub endpoint: String,

    /// Optional bearer token
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// Request timeout in milliseconds
    #[serde(default = "default_remote_timeout_ms")]
    pub timeout_ms: u64,

    /// Consecutive failures before the online path is skipped
    #[serde(default = "default_breaker_failures")]
    pub breaker_failures: usize,

    /// Seconds the online path stays skipped once tripped
    #[serde(default = "default_breaker_reset_secs")]
    pub breaker_reset_secs: u64,
}

fn default_remote_enabled() -> bool {
    true
}

fn default_remote_endpoint() -> String {
    "http://127.0.0.1:5000/chatbot".to_string()
}

fn default_remote_timeout_ms() -> u64 {
    10_000
}

fn default_breaker_failures() -> usize {
    3
}

fn default_breaker_reset_secs() -> u64 {
    30
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: default_remote_enabled(),
            endpoint: default_remote_endpoint(),
            api_key: None,
            timeout_ms: default_remote_timeout_ms(),
            breaker_failures: default_breaker_failures(),
            breaker_reset_secs: default_breaker_reset_secs(),
        }
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("enabled", &self.enabled)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_ms", &self.timeout_ms)
            .field("breaker_failures", &self.breaker_failures)
            .field("breaker_reset_secs", &self.breaker_reset_secs)
            .finish()
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn breaker_reset_timeout(&self) -> Duration {
        Duration::from_secs(self.breaker_reset_secs)
    }
}

/// Local model artifact and generation settings
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Directory holding downloaded model artifacts
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Model hub base URL
    #[serde(default = "default_hub_url")]
    pub hub_url: String,

    /// Hub repository publishing the GGUF files
    #[serde(default = "default_repo_id")]
    pub repo_id: String,

    /// File name of the artifact to fetch and load
    #[serde(default = "default_artifact_name")]
    pub artifact_name: String,

    /// Explicit source URL; derived from hub/repo/artifact when absent
    #[serde(default)]
    pub source_url: Option<String>,

    /// Token limit for one local generation
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_hub_url() -> String {
    "https://huggingface.co".to_string()
}

fn default_repo_id() -> String {
    "unsloth/gemma-3n-E2B-it-GGUF".to_string()
}

fn default_artifact_name() -> String {
    "gemma-3n-E2B-it-Q4_K_M.gguf".to_string()
}

fn default_max_tokens() -> usize {
    512
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            hub_url: default_hub_url(),
            repo_id: default_repo_id(),
            artifact_name: default_artifact_name(),
            source_url: None,
            max_tokens: default_max_tokens(),
        }
    }
}

impl ModelConfig {
    /// Where the configured artifact is fetched from
    pub fn artifact_url(&self) -> String {
        self.source_url.clone().unwrap_or_else(|| {
            crate::download::catalog::resolve_url(&self.hub_url, &self.repo_id, &self.artifact_name)
        })
    }

    /// Where the configured artifact lives once downloaded
    pub fn artifact_path(&self) -> PathBuf {
        self.models_dir.join(&self.artifact_name)
    }
}

/// Reachability probing
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectivityConfig {
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_probe_url() -> String {
    "https://clients3.google.com/generate_204".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    3000
}

fn default_poll_interval_secs() -> u64 {
    5
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_url: default_probe_url(),
            probe_timeout_ms: default_probe_timeout_ms(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl ConnectivityConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Offline corpus source
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorpusConfig {
    /// JSON file replacing the built-in corpus
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Log output
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
