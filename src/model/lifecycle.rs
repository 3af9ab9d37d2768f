//! Owner of the single loaded local model context

use super::runtime::{
    stop_sequences, truncate_at_stop, LoadConfig, LoadedModel, LocalModelRuntime,
};
use crate::conversation::{Message, SharedConversation};
use crate::error::{AssistError, Result};
use crate::metrics::METRICS;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Local context state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
    Error(String),
}

/// Holds at most one ready context
///
/// The context sits behind an async `RwLock`: generation holds a read
/// guard for its whole duration, load and release take the write guard,
/// so teardown always waits for an outstanding generation.
pub struct ModelLifecycleManager {
    runtime: Arc<dyn LocalModelRuntime>,
    conversation: SharedConversation,
    state: Mutex<ModelState>,
    loaded_path: Mutex<Option<PathBuf>>,
    context: RwLock<Option<Box<dyn LoadedModel>>>,
}

impl ModelLifecycleManager {
    pub fn new(runtime: Arc<dyn LocalModelRuntime>, conversation: SharedConversation) -> Self {
        Self {
            runtime,
            conversation,
            state: Mutex::new(ModelState::Unloaded),
            loaded_path: Mutex::new(None),
            context: RwLock::new(None),
        }
    }

    pub fn state(&self) -> ModelState {
        self.state.lock().clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.state.lock() == ModelState::Ready
    }

    pub fn loaded_path(&self) -> Option<PathBuf> {
        self.loaded_path.lock().clone()
    }

    /// Load `model_path`, releasing any current context first
    pub async fn load(&self, model_path: impl AsRef<Path>) -> Result<()> {
        let model_path = model_path.as_ref();

        match tokio::fs::metadata(model_path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(AssistError::ModelNotFound(model_path.display().to_string())),
        }

        let mut slot = self.context.write().await;
        let mut guard = LoadingGuard {
            state: &self.state,
            armed: true,
        };

        if slot.is_some() {
            info!("Releasing current model before loading {}", model_path.display());
            self.teardown(&mut slot).await;
        }

        self.set_state(ModelState::Loading);
        let config = LoadConfig::fixed(model_path);
        debug!(
            context_size = config.context_size,
            gpu_layers = config.gpu_layers,
            use_mlock = config.use_mlock,
            "Loading local model"
        );

        let loaded = self.runtime.load(&config).await;
        guard.armed = false;

        match loaded {
            Ok(context) => {
                *slot = Some(context);
                *self.loaded_path.lock() = Some(model_path.to_path_buf());
                self.set_state(ModelState::Ready);
                METRICS.record_model_load(true);
                info!("Local model ready: {}", model_path.display());
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                self.set_state(ModelState::Error(reason.clone()));
                METRICS.record_model_load(false);
                error!("Local model load failed: {}", reason);
                Err(AssistError::ModelLoadFailed(reason))
            }
        }
    }

    /// Free the current context and reset the conversation
    ///
    /// No-op when nothing is loaded.
    pub async fn release(&self) -> Result<()> {
        let mut slot = self.context.write().await;
        if slot.is_none() {
            debug!("Release requested with no model loaded");
            return Ok(());
        }
        self.teardown(&mut slot).await;
        Ok(())
    }

    /// Clear an error state so the manager reads as unloaded again
    pub fn acknowledge_error(&self) {
        let mut state = self.state.lock();
        if matches!(*state, ModelState::Error(_)) {
            *state = ModelState::Unloaded;
        }
    }

    /// Generate a reply to `conversation`, cut at the first stop sequence
    ///
    /// Fails with `ModelNotReady` unless a context is ready and no load or
    /// release is in progress.
    pub async fn generate(
        &self,
        conversation: &[Message],
        stop: &[String],
        max_tokens: usize,
    ) -> Result<String> {
        if !self.is_ready() {
            return Err(AssistError::ModelNotReady);
        }

        let guard = self
            .context
            .try_read()
            .map_err(|_| AssistError::ModelNotReady)?;
        let context = guard.as_ref().ok_or(AssistError::ModelNotReady)?;

        let start = Instant::now();
        let raw = context
            .generate(conversation, stop, max_tokens)
            .await
            .map_err(|e| AssistError::GenerationFailed(e.to_string()))?;
        METRICS
            .local_generation_duration
            .observe(start.elapsed().as_secs_f64());

        Ok(truncate_at_stop(&raw, stop))
    }

    /// Generate with the standard stop sequences
    pub async fn generate_default(&self, conversation: &[Message], max_tokens: usize) -> Result<String> {
        self.generate(conversation, &stop_sequences(), max_tokens).await
    }

    async fn teardown(&self, slot: &mut Option<Box<dyn LoadedModel>>) {
        drop(slot.take());
        if let Err(e) = self.runtime.release_all().await {
            warn!("Runtime release reported an error: {}", e);
        }
        *self.loaded_path.lock() = None;
        self.conversation.reset();
        self.set_state(ModelState::Unloaded);
        info!("Local model released");
    }

    fn set_state(&self, next: ModelState) {
        let mut state = self.state.lock();
        debug!("Model state {:?} -> {:?}", *state, next);
        *state = next;
    }
}

/// Leaves the manager `Unloaded` when a load is dropped midway
struct LoadingGuard<'a> {
    state: &'a Mutex<ModelState>,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("Local model load interrupted before completion");
        *self.state.lock() = ModelState::Unloaded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;
    use crate::model::runtime::RuntimeError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingRuntime {
        live: Arc<AtomicUsize>,
        fail_load: bool,
        load_delay: Option<Duration>,
    }

    struct CountedModel {
        live: Arc<AtomicUsize>,
        reply: String,
    }

    impl Drop for CountedModel {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl LoadedModel for CountedModel {
        async fn generate(&self, _: &[Message], _: &[String], _: usize) -> std::result::Result<String, RuntimeError> {
            Ok(self.reply.clone())
        }
    }

    #[async_trait]
    impl LocalModelRuntime for CountingRuntime {
        async fn load(&self, config: &LoadConfig) -> std::result::Result<Box<dyn LoadedModel>, RuntimeError> {
            if let Some(delay) = self.load_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_load {
                return Err(RuntimeError::Load("unsupported file".to_string()));
            }
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountedModel {
                live: self.live.clone(),
                reply: format!("{}<end_of_turn>junk", config.model_path.display()),
            }))
        }

        async fn release_all(&self) -> std::result::Result<(), RuntimeError> {
            Ok(())
        }
    }

    fn model_file(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"gguf").unwrap();
        path
    }

    #[tokio::test]
    async fn test_missing_file_is_model_not_found() {
        let manager = ModelLifecycleManager::new(Arc::new(CountingRuntime::default()), SharedConversation::default());
        let result = manager.load("/definitely/not/here.gguf").await;
        assert!(matches!(result, Err(AssistError::ModelNotFound(_))));
        assert_eq!(manager.state(), ModelState::Unloaded);
    }

    #[tokio::test]
    async fn test_generate_requires_ready() {
        let manager = ModelLifecycleManager::new(Arc::new(CountingRuntime::default()), SharedConversation::default());
        let result = manager.generate_default(&[], 16).await;
        assert!(matches!(result, Err(AssistError::ModelNotReady)));
    }

    #[tokio::test]
    async fn test_generate_truncates_at_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = model_file(&dir, "a.gguf");
        let manager = ModelLifecycleManager::new(Arc::new(CountingRuntime::default()), SharedConversation::default());

        manager.load(&path).await.unwrap();
        let reply = manager.generate_default(&[], 16).await.unwrap();
        assert_eq!(reply, path.display().to_string());
    }

    #[tokio::test]
    async fn test_reload_keeps_single_context_and_resets_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let first = model_file(&dir, "a.gguf");
        let second = model_file(&dir, "b.gguf");

        let runtime = CountingRuntime::default();
        let live = runtime.live.clone();
        let conversation = SharedConversation::default();
        let manager = ModelLifecycleManager::new(Arc::new(runtime), conversation.clone());

        manager.load(&first).await.unwrap();
        conversation.append_and_snapshot(Role::User, "hello");
        manager.load(&second).await.unwrap();

        assert_eq!(live.load(Ordering::SeqCst), 1);
        assert_eq!(manager.loaded_path(), Some(second));
        assert_eq!(conversation.snapshot().len(), 1);
        assert!(manager.is_ready());
    }

    #[tokio::test]
    async fn test_load_failure_enters_error_until_acknowledged() {
        let dir = tempfile::tempdir().unwrap();
        let path = model_file(&dir, "broken.gguf");
        let runtime = CountingRuntime {
            fail_load: true,
            ..Default::default()
        };
        let manager = ModelLifecycleManager::new(Arc::new(runtime), SharedConversation::default());

        let result = manager.load(&path).await;
        assert!(matches!(result, Err(AssistError::ModelLoadFailed(_))));
        assert!(matches!(manager.state(), ModelState::Error(_)));

        manager.acknowledge_error();
        assert_eq!(manager.state(), ModelState::Unloaded);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = model_file(&dir, "a.gguf");
        let runtime = CountingRuntime::default();
        let live = runtime.live.clone();
        let manager = ModelLifecycleManager::new(Arc::new(runtime), SharedConversation::default());

        manager.load(&path).await.unwrap();
        manager.release().await.unwrap();
        manager.release().await.unwrap();

        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert_eq!(manager.state(), ModelState::Unloaded);
        assert!(manager.loaded_path().is_none());
    }

    #[tokio::test]
    async fn test_abandoned_load_returns_to_unloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = model_file(&dir, "slow.gguf");
        let runtime = CountingRuntime {
            load_delay: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let live = runtime.live.clone();
        let manager = ModelLifecycleManager::new(Arc::new(runtime), SharedConversation::default());

        let result = tokio::time::timeout(Duration::from_millis(100), manager.load(&path)).await;
        assert!(result.is_err());

        assert_eq!(manager.state(), ModelState::Unloaded);
        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert!(manager.loaded_path().is_none());
        assert!(matches!(
            manager.generate_default(&[], 16).await,
            Err(AssistError::ModelNotReady)
        ));
    }
}
