//! End-to-end tests for the response pipeline
//!
//! A mockito server stands in for the remote inference endpoint and an
//! in-test runtime stands in for the on-device model.

use async_trait::async_trait;
use hybrid_assist::connectivity::{ConnectivityMonitor, ConnectivityStatus, ProbeError, ReachabilityProbe};
use hybrid_assist::config::RemoteConfig;
use hybrid_assist::conversation::{Message, Role, SharedConversation};
use hybrid_assist::error::AssistError;
use hybrid_assist::model::{LoadConfig, LoadedModel, LocalModelRuntime, ModelLifecycleManager, RuntimeError};
use hybrid_assist::offline::OfflineEngine;
use hybrid_assist::orchestrator::{
    Answer, Orchestrator, Provenance, ResponseStrategy, StrategyOutcome, Turn, FALLBACK_TEXT,
    IN_DOMAIN_FALLBACK_TEXT,
};
use hybrid_assist::remote::RemoteInferenceClient;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::Notify;

struct UnreachableProbe;

#[async_trait]
impl ReachabilityProbe for UnreachableProbe {
    async fn probe(&self) -> Result<ConnectivityStatus, ProbeError> {
        Err(ProbeError::Request("no route to host".to_string()))
    }
}

struct EchoRuntime;

struct EchoModel;

#[async_trait]
impl LoadedModel for EchoModel {
    async fn generate(&self, conversation: &[Message], _: &[String], _: usize) -> Result<String, RuntimeError> {
        let last = conversation.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(format!("Local answer to: {}<end_of_turn>ignored", last))
    }
}

#[async_trait]
impl LocalModelRuntime for EchoRuntime {
    async fn load(&self, _config: &LoadConfig) -> Result<Box<dyn LoadedModel>, RuntimeError> {
        Ok(Box::new(EchoModel))
    }

    async fn release_all(&self) -> Result<(), RuntimeError> {
        Ok(())
    }
}

struct Pipeline {
    orchestrator: Orchestrator,
    monitor: Arc<ConnectivityMonitor>,
    lifecycle: Arc<ModelLifecycleManager>,
    conversation: SharedConversation,
}

fn pipeline(remote_url: String) -> Pipeline {
    pipeline_with_timeout(remote_url, 2000)
}

fn pipeline_with_timeout(remote_url: String, timeout_ms: u64) -> Pipeline {
    let conversation = SharedConversation::default();
    let monitor = Arc::new(ConnectivityMonitor::new(Arc::new(UnreachableProbe)));
    let remote = RemoteInferenceClient::new(&RemoteConfig {
        endpoint: remote_url,
        timeout_ms,
        ..RemoteConfig::default()
    })
    .unwrap();
    let lifecycle = Arc::new(ModelLifecycleManager::new(Arc::new(EchoRuntime), conversation.clone()));

    let orchestrator = Orchestrator::standard(
        conversation.clone(),
        monitor.clone(),
        Some(Arc::new(remote)),
        lifecycle.clone(),
        Arc::new(OfflineEngine::builtin()),
        128,
    );

    Pipeline {
        orchestrator,
        monitor,
        lifecycle,
        conversation,
    }
}

#[tokio::test]
async fn test_out_of_domain_queries_offline_get_fallback() {
    let mut server = mockito::Server::new_async().await;
    let remote = server.mock("POST", "/chatbot").expect(0).create_async().await;
    let p = pipeline(format!("{}/chatbot", server.url()));
    let engine = OfflineEngine::builtin();

    for query in ["Who won the football match?", "What is the capital of France?", "Tell me a joke"] {
        assert!(!engine.can_answer(query));
        let reply = p.orchestrator.respond(query).await.unwrap();
        assert_eq!(reply.provenance, Provenance::Fallback);
        assert_eq!(reply.text, FALLBACK_TEXT);
        assert!((reply.confidence - 0.1).abs() < f32::EPSILON);
    }

    remote.assert_async().await;
}

#[tokio::test]
async fn test_on_topic_query_without_answer_gets_clinic_referral() {
    let p = pipeline("http://127.0.0.1:9/chatbot".to_string());

    let reply = p
        .orchestrator
        .respond("Is menopause a reproductive health issue?")
        .await
        .unwrap();

    assert_eq!(reply.provenance, Provenance::Fallback);
    assert_eq!(reply.text, IN_DOMAIN_FALLBACK_TEXT);
    assert_eq!(reply.category.as_deref(), Some("General SRH"));
}

/// Accepts one connection, reads the request and never answers
async fn stalled_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(socket);
    });
    format!("http://{}/chatbot", addr)
}

#[tokio::test]
async fn test_remote_timeout_falls_back_to_corpus() {
    let p = pipeline_with_timeout(stalled_endpoint().await, 300);
    p.monitor.report(ConnectivityStatus::connected("wifi"));

    let start = Instant::now();
    let reply = p
        .orchestrator
        .respond("What is the legal age for marriage in Liberia?")
        .await
        .unwrap();

    assert_eq!(reply.provenance, Provenance::OfflineMatched);
    assert_eq!(
        reply.text,
        "The legal age for marriage in Liberia is 18 years for both boys and girls."
    );
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_online_reply_keeps_server_category() {
    let mut server = mockito::Server::new_async().await;
    let _remote = server
        .mock("POST", "/chatbot")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"response": "Antenatal visits help.", "category": "Maternal Health"}"#)
        .create_async()
        .await;
    let p = pipeline(format!("{}/chatbot", server.url()));
    p.monitor.report(ConnectivityStatus::connected("wifi"));

    // the classifier alone would label this "HIV & STIs"
    let reply = p.orchestrator.respond("hiv hiv hiv").await.unwrap();
    assert_eq!(reply.provenance, Provenance::Online);
    assert_eq!(reply.category.as_deref(), Some("Maternal Health"));
}

#[tokio::test]
async fn test_connectivity_drop_switches_to_offline_path() {
    let mut server = mockito::Server::new_async().await;
    let remote = server
        .mock("POST", "/chatbot")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"response": "Eighteen years."}"#)
        .expect(1)
        .create_async()
        .await;
    let p = pipeline(format!("{}/chatbot", server.url()));

    p.monitor.report(ConnectivityStatus::connected("wifi"));
    let online = p.orchestrator.respond("What is the marriage age?").await.unwrap();
    assert_eq!(online.provenance, Provenance::Online);
    assert_eq!(online.text, "Eighteen years.");
    assert!((online.confidence - 0.9).abs() < f32::EPSILON);

    p.monitor.report(ConnectivityStatus::disconnected());
    let offline = p
        .orchestrator
        .respond("What is the legal age for marriage in Liberia?")
        .await
        .unwrap();
    assert_eq!(offline.provenance, Provenance::OfflineMatched);
    assert_eq!(
        offline.text,
        "The legal age for marriage in Liberia is 18 years for both boys and girls."
    );
    assert_eq!(offline.category.as_deref(), Some("Legal Framework"));

    remote.assert_async().await;
    assert_eq!(p.conversation.snapshot().len(), 5);
}

#[tokio::test]
async fn test_remote_failure_falls_back_to_local_model() {
    let mut server = mockito::Server::new_async().await;
    let _remote = server
        .mock("POST", "/chatbot")
        .with_status(500)
        .with_body(r#"{"error": "model crashed"}"#)
        .create_async()
        .await;
    let p = pipeline(format!("{}/chatbot", server.url()));

    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("local.gguf");
    std::fs::write(&model_path, b"gguf").unwrap();
    p.lifecycle.load(&model_path).await.unwrap();

    p.monitor.report(ConnectivityStatus::connected("cellular"));
    let reply = p.orchestrator.respond("How do I prevent HIV?").await.unwrap();

    assert_eq!(reply.provenance, Provenance::OfflineGenerative);
    assert_eq!(reply.text, "Local answer to: How do I prevent HIV?");

    let messages = p.conversation.snapshot();
    assert_eq!(messages.last().unwrap().role, Role::Assistant);
    assert_eq!(messages.last().unwrap().content, reply.text);
}

#[tokio::test]
async fn test_model_release_clears_history_and_drops_late_reply() {
    let mut server = mockito::Server::new_async().await;
    let _remote = server.mock("POST", "/chatbot").expect(0).create_async().await;
    let p = pipeline(format!("{}/chatbot", server.url()));

    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("local.gguf");
    std::fs::write(&model_path, b"gguf").unwrap();
    p.lifecycle.load(&model_path).await.unwrap();

    p.orchestrator.respond("What is family planning?").await.unwrap();
    assert_eq!(p.conversation.snapshot().len(), 3);

    p.lifecycle.release().await.unwrap();
    assert_eq!(p.conversation.snapshot().len(), 1);

    let reply = p.orchestrator.respond("What is family planning?").await.unwrap();
    assert_eq!(reply.provenance, Provenance::OfflineMatched);
}

struct GatedStrategy {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl ResponseStrategy for GatedStrategy {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn provenance(&self) -> Provenance {
        Provenance::OfflineGenerative
    }

    async fn attempt(&self, turn: &Turn) -> StrategyOutcome {
        self.entered.notify_one();
        self.release.notified().await;
        StrategyOutcome::Answered(Answer::new(format!("slow reply to {}", turn.user_text), 0.7))
    }
}

#[tokio::test]
async fn test_second_respond_while_first_pending_is_busy() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let conversation = SharedConversation::default();
    let orchestrator = Arc::new(Orchestrator::new(
        conversation.clone(),
        vec![Box::new(GatedStrategy {
            entered: entered.clone(),
            release: release.clone(),
        })],
    ));

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.respond("first question").await })
    };
    entered.notified().await;

    let second = orchestrator.respond("second question").await;
    assert!(matches!(second, Err(AssistError::Busy)));

    release.notify_one();
    let reply = first.await.unwrap().unwrap();
    assert_eq!(reply.text, "slow reply to first question");

    let contents: Vec<String> = conversation.snapshot().into_iter().map(|m| m.content).collect();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[1], "first question");
    assert_eq!(contents[2], "slow reply to first question");
    assert!(!orchestrator.is_busy());
}
