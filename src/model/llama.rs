//! llama.cpp-backed runtime for GGUF models

use super::runtime::{LoadConfig, LoadedModel, LocalModelRuntime, RuntimeError};
use crate::conversation::{Message, Role};
use async_trait::async_trait;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::debug;

/// Tokens decoded per prefill batch
const PREFILL_BATCH_SIZE: usize = 512;

/// Render a conversation with the Gemma turn template
///
/// Gemma has no system role, so system messages are folded into the first
/// user turn.
pub fn render_prompt(conversation: &[Message]) -> String {
    let mut prompt = String::new();
    let mut pending_system = String::new();

    for message in conversation {
        match message.role {
            Role::System => {
                pending_system.push_str(&message.content);
                pending_system.push_str("\n\n");
            }
            Role::User => {
                prompt.push_str("<start_of_turn>user\n");
                prompt.push_str(&pending_system);
                pending_system.clear();
                prompt.push_str(&message.content);
                prompt.push_str("<end_of_turn>\n");
            }
            Role::Assistant => {
                prompt.push_str("<start_of_turn>model\n");
                prompt.push_str(&message.content);
                prompt.push_str("<end_of_turn>\n");
            }
        }
    }

    prompt.push_str("<start_of_turn>model\n");
    prompt
}

/// Runtime sharing one llama.cpp backend across loads
pub struct LlamaRuntime {
    backend: Arc<LlamaBackend>,
}

impl LlamaRuntime {
    pub fn new() -> Result<Self, RuntimeError> {
        let backend = LlamaBackend::init().map_err(|e| RuntimeError::Load(e.to_string()))?;
        Ok(Self {
            backend: Arc::new(backend),
        })
    }
}

#[async_trait]
impl LocalModelRuntime for LlamaRuntime {
    async fn load(&self, config: &LoadConfig) -> Result<Box<dyn LoadedModel>, RuntimeError> {
        let backend = self.backend.clone();
        let config = config.clone();

        let model = tokio::task::spawn_blocking(move || {
            let params = LlamaModelParams::default()
                .with_n_gpu_layers(config.gpu_layers)
                .with_use_mlock(config.use_mlock);
            LlamaModel::load_from_file(&backend, &config.model_path, &params)
                .map_err(|e| RuntimeError::Load(e.to_string()))
        })
        .await
        .map_err(|e| RuntimeError::Load(e.to_string()))??;

        Ok(Box::new(LlamaContext {
            backend: self.backend.clone(),
            model: Arc::new(model),
            context_size: config.context_size,
        }))
    }

    async fn release_all(&self) -> Result<(), RuntimeError> {
        // Model memory is freed when the context is dropped; the backend lives
        // as long as the runtime.
        Ok(())
    }
}

struct LlamaContext {
    backend: Arc<LlamaBackend>,
    model: Arc<LlamaModel>,
    context_size: u32,
}

#[async_trait]
impl LoadedModel for LlamaContext {
    async fn generate(
        &self,
        conversation: &[Message],
        stop_sequences: &[String],
        max_tokens: usize,
    ) -> Result<String, RuntimeError> {
        let prompt = render_prompt(conversation);
        let backend = self.backend.clone();
        let model = self.model.clone();
        let stops = stop_sequences.to_vec();
        let context_size = self.context_size;

        tokio::task::spawn_blocking(move || {
            run_generation(&backend, &model, &prompt, &stops, max_tokens, context_size)
        })
        .await
        .map_err(|e| RuntimeError::Generation(e.to_string()))?
    }
}

fn gen_err(e: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::Generation(e.to_string())
}

fn run_generation(
    backend: &LlamaBackend,
    model: &LlamaModel,
    prompt: &str,
    stops: &[String],
    max_tokens: usize,
    context_size: u32,
) -> Result<String, RuntimeError> {
    let n_ctx = NonZeroU32::new(context_size)
        .ok_or_else(|| RuntimeError::Generation("invalid context size".to_string()))?;
    let ctx_params = LlamaContextParams::default().with_n_ctx(Some(n_ctx));
    let mut ctx = model
        .new_context(backend, ctx_params)
        .map_err(gen_err)?;

    let tokens = model
        .str_to_token(prompt, AddBos::Always)
        .map_err(gen_err)?;
    if tokens.len() >= context_size as usize {
        return Err(RuntimeError::Generation(format!(
            "prompt of {} tokens exceeds context window",
            tokens.len()
        )));
    }

    let mut batch = LlamaBatch::new(PREFILL_BATCH_SIZE, 1);
    let last_pos = (tokens.len() as i32).saturating_sub(1);
    let mut pos = 0i32;
    for chunk in tokens.chunks(PREFILL_BATCH_SIZE) {
        batch.clear();
        for (j, &token) in chunk.iter().enumerate() {
            let p = pos + j as i32;
            batch.add(token, p, &[0], p == last_pos).map_err(gen_err)?;
        }
        ctx.decode(&mut batch).map_err(gen_err)?;
        pos += chunk.len() as i32;
    }

    let mut sampler = LlamaSampler::chain_simple([LlamaSampler::dist(1234), LlamaSampler::greedy()]);
    let mut output = String::new();
    let mut n_cur = tokens.len() as i32;
    let budget = max_tokens.min(context_size as usize - tokens.len());

    for _ in 0..budget {
        let token = sampler.sample(&ctx, batch.n_tokens() - 1);
        sampler.accept(token);

        if model.is_eog_token(token) {
            break;
        }

        let piece = model
            .token_to_str(token, Special::Tokenize)
            .unwrap_or_default();
        output.push_str(&piece);

        if stops.iter().any(|s| !s.is_empty() && output.contains(s.as_str())) {
            break;
        }

        batch.clear();
        batch.add(token, n_cur, &[0], true).map_err(gen_err)?;
        n_cur += 1;
        ctx.decode(&mut batch).map_err(gen_err)?;
    }

    debug!("Generated {} chars locally", output.len());
    Ok(output)
}
