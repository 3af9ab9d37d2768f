//! Interactive chat over the hybrid pipeline
//!
//! ```text
//! cargo run --example chat -- [config.toml] [--download]
//! cargo run --example chat --features llama -- config.toml --download
//! ```
//!
//! Type a question per line. `/status` prints connectivity and model state,
//! `/metrics` dumps Prometheus metrics, `/quit` exits.

use anyhow::Context;
use hybrid_assist::config::AssistConfig;
use hybrid_assist::connectivity::{ConnectivityMonitor, HttpProbe};
use hybrid_assist::conversation::SharedConversation;
use hybrid_assist::download::ModelDownloader;
use hybrid_assist::logging::init_tracing;
use hybrid_assist::metrics::METRICS;
use hybrid_assist::model::{LocalModelRuntime, ModelLifecycleManager};
use hybrid_assist::offline::OfflineEngine;
use hybrid_assist::orchestrator::Orchestrator;
use hybrid_assist::remote::RemoteInferenceClient;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Stand-in used when the crate is built without a native runtime
#[cfg(not(feature = "llama"))]
struct NoLocalRuntime;

#[cfg(not(feature = "llama"))]
#[async_trait::async_trait]
impl LocalModelRuntime for NoLocalRuntime {
    async fn load(
        &self,
        _config: &hybrid_assist::model::LoadConfig,
    ) -> Result<Box<dyn hybrid_assist::model::LoadedModel>, hybrid_assist::model::RuntimeError> {
        Err(hybrid_assist::model::RuntimeError::Load(
            "built without the `llama` feature".to_string(),
        ))
    }

    async fn release_all(&self) -> Result<(), hybrid_assist::model::RuntimeError> {
        Ok(())
    }
}

fn local_runtime() -> anyhow::Result<Arc<dyn LocalModelRuntime>> {
    #[cfg(feature = "llama")]
    {
        Ok(Arc::new(hybrid_assist::model::LlamaRuntime::new()?))
    }
    #[cfg(not(feature = "llama"))]
    {
        Ok(Arc::new(NoLocalRuntime))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let download = args.iter().any(|a| a == "--download");
    let config_path = args.iter().find(|a| !a.starts_with("--")).map(PathBuf::from);

    let config = AssistConfig::load(config_path.as_deref()).context("loading configuration")?;
    init_tracing(&config.logging);

    let shutdown = CancellationToken::new();
    let probe = Arc::new(HttpProbe::new(&config.connectivity)?);
    let monitor = Arc::new(ConnectivityMonitor::new(probe));
    monitor.refresh().await;
    let poller = monitor
        .clone()
        .spawn_polling(config.connectivity.poll_interval(), shutdown.clone());

    let remote = if config.remote.enabled {
        Some(Arc::new(RemoteInferenceClient::new(&config.remote)?))
    } else {
        None
    };

    let conversation = SharedConversation::default();
    let lifecycle = Arc::new(ModelLifecycleManager::new(local_runtime()?, conversation.clone()));

    let artifact = config.model.artifact_path();
    if download && !artifact.exists() {
        let downloader = ModelDownloader::new(&config.model.models_dir)?;
        let mut last = None;
        downloader
            .download(&config.model.artifact_name, &config.model.artifact_url(), |pct| {
                if last != Some(pct) {
                    last = Some(pct);
                    print!("\rdownloading {}: {:>3}%", config.model.artifact_name, pct);
                    let _ = std::io::stdout().flush();
                }
            })
            .await
            .context("downloading model")?;
        println!();
    }

    if artifact.exists() {
        if let Err(e) = lifecycle.load(&artifact).await {
            eprintln!("local model unavailable: {}", e);
            lifecycle.acknowledge_error();
        }
    }

    let engine = Arc::new(OfflineEngine::from_config(&config.corpus)?);
    let orchestrator = Orchestrator::standard(
        conversation,
        monitor.clone(),
        remote,
        lifecycle.clone(),
        engine,
        config.model.max_tokens,
    );

    println!("Ask a question (/status, /metrics, /quit).");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/status" => {
                println!("connectivity: {:?}", monitor.current_status());
                println!("model: {:?}", lifecycle.state());
            }
            "/metrics" => print!("{}", METRICS.export_prometheus()),
            text => {
                let reply = orchestrator.respond(text).await?;
                println!(
                    "[{} {:.2} {}] {}",
                    reply.provenance,
                    reply.confidence,
                    reply.category.as_deref().unwrap_or("-"),
                    reply.text
                );
                for related in &reply.related {
                    println!("  see also: {}", related);
                }
            }
        }
    }

    shutdown.cancel();
    poller.await?;
    lifecycle.release().await?;
    Ok(())
}
