//! Local model runtime abstraction
//!
//! The runtime is an opaque capability: it loads a model file into a
//! context, generates text from a conversation, and frees everything it
//! holds. Resource parameters are fixed constants.

use crate::conversation::Message;
use crate::error::AssistError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Context window in tokens
pub const CONTEXT_SIZE: u32 = 2048;

/// Lock model weights in memory
pub const USE_MLOCK: bool = true;

/// Layers offloaded to the accelerator
pub const GPU_LAYERS: u32 = 1;

/// End-of-turn markers used by common chat templates
pub const STOP_SEQUENCES: &[&str] = &[
    "</s>",
    "<|end|>",
    "<|eot_id|>",
    "<|end_of_text|>",
    "<|im_end|>",
    "<|EOT|>",
    "<|END_OF_TURN_TOKEN|>",
    "<|end_of_turn|>",
    "<|endoftext|>",
    "<end_of_turn>",
];

/// Owned copy of the stop sequence set
pub fn stop_sequences() -> Vec<String> {
    STOP_SEQUENCES.iter().map(|s| s.to_string()).collect()
}

/// Cut `text` at the earliest occurrence of any stop sequence
pub fn truncate_at_stop(text: &str, stops: &[String]) -> String {
    let cut = stops
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
        .unwrap_or(text.len());
    text[..cut].to_string()
}

/// Runtime errors
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Load failed: {0}")]
    Load(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Release failed: {0}")]
    Release(String),
}

impl From<RuntimeError> for AssistError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Load(msg) => AssistError::ModelLoadFailed(msg),
            RuntimeError::Generation(msg) => AssistError::GenerationFailed(msg),
            RuntimeError::Release(msg) => AssistError::GenerationFailed(msg),
        }
    }
}

/// Parameters handed to the load primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    pub model_path: PathBuf,
    pub use_mlock: bool,
    pub context_size: u32,
    pub gpu_layers: u32,
}

impl LoadConfig {
    /// Config for `model_path` with the fixed resource parameters
    pub fn fixed(model_path: impl AsRef<Path>) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            use_mlock: USE_MLOCK,
            context_size: CONTEXT_SIZE,
            gpu_layers: GPU_LAYERS,
        }
    }
}

/// Loads model contexts
#[async_trait]
pub trait LocalModelRuntime: Send + Sync {
    async fn load(&self, config: &LoadConfig) -> Result<Box<dyn LoadedModel>, RuntimeError>;

    /// Free every resource the runtime still holds
    async fn release_all(&self) -> Result<(), RuntimeError>;
}

/// A loaded model context
#[async_trait]
pub trait LoadedModel: Send + Sync {
    async fn generate(
        &self,
        conversation: &[Message],
        stop_sequences: &[String],
        max_tokens: usize,
    ) -> Result<String, RuntimeError>;
}
