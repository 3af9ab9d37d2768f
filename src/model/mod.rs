//! Local model lifecycle

pub mod lifecycle;
#[cfg(feature = "llama")]
pub mod llama;
pub mod runtime;

pub use lifecycle::{ModelLifecycleManager, ModelState};
#[cfg(feature = "llama")]
pub use llama::LlamaRuntime;
pub use runtime::{
    stop_sequences, truncate_at_stop, LoadConfig, LoadedModel, LocalModelRuntime, RuntimeError,
    CONTEXT_SIZE, GPU_LAYERS, STOP_SEQUENCES, USE_MLOCK,
};
