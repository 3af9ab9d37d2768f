//! Error types for the inference pipeline

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, AssistError>;

/// Pipeline error taxonomy
///
/// Transport and resource failures are normally absorbed by the
/// orchestrator and turned into a lower-confidence reply. Only invalid
/// input, `Busy` and storage problems reach the caller of `respond`.
#[derive(Error, Debug)]
pub enum AssistError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("download already in progress for {0}")]
    DownloadInProgress(String),

    #[error("download cancelled: {0}")]
    DownloadCancelled(String),

    #[error("a response is already being generated")]
    Busy,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("no local model is ready")]
    ModelNotReady,

    #[error("local generation failed: {0}")]
    GenerationFailed(String),

    #[error("network timeout: {0}")]
    NetworkTimeout(String),

    #[error("remote inference failed: {0}")]
    RemoteFailed(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssistError {
    /// Whether the caller may retry the same operation unchanged
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AssistError::DownloadFailed(_)
                | AssistError::DownloadInProgress(_)
                | AssistError::Busy
                | AssistError::NetworkTimeout(_)
                | AssistError::RemoteFailed(_)
        )
    }
}

impl From<config::ConfigError> for AssistError {
    fn from(err: config::ConfigError) -> Self {
        AssistError::Configuration(err.to_string())
    }
}
