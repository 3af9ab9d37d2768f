//! Response strategies, tried in order by the orchestrator

use super::models::{Answer, Provenance, StrategyOutcome, Turn};
use crate::connectivity::ConnectivityMonitor;
use crate::error::AssistError;
use crate::model::ModelLifecycleManager;
use crate::offline::{classify, in_domain, OfflineEngine};
use crate::remote::RemoteInferenceClient;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const ONLINE_CONFIDENCE: f32 = 0.9;
pub const GENERATIVE_CONFIDENCE: f32 = 0.7;
pub const FALLBACK_CONFIDENCE: f32 = 0.1;

/// Reply used when nothing better is available and the query is off topic
pub const FALLBACK_TEXT: &str = "I'm currently offline and don't have information about that \
topic. Please check your internet connection or try asking about sexual and reproductive health \
in Liberia.";

/// Reply for an on-topic query that nothing could answer
pub const IN_DOMAIN_FALLBACK_TEXT: &str = "I understand you're asking about sexual and \
reproductive health in Liberia. While I don't have a specific answer for that question in my \
offline database, I recommend contacting your local health clinic or the Ministry of Health for \
more detailed information.";

/// One way of answering a turn
#[async_trait]
pub trait ResponseStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn provenance(&self) -> Provenance;

    async fn attempt(&self, turn: &Turn) -> StrategyOutcome;
}

/// Remote inference, only while connected
pub struct OnlineStrategy {
    monitor: Arc<ConnectivityMonitor>,
    client: Arc<RemoteInferenceClient>,
}

impl OnlineStrategy {
    pub fn new(monitor: Arc<ConnectivityMonitor>, client: Arc<RemoteInferenceClient>) -> Self {
        Self { monitor, client }
    }
}

#[async_trait]
impl ResponseStrategy for OnlineStrategy {
    fn name(&self) -> &'static str {
        "online"
    }

    fn provenance(&self) -> Provenance {
        Provenance::Online
    }

    async fn attempt(&self, turn: &Turn) -> StrategyOutcome {
        if !self.monitor.is_connected() {
            return StrategyOutcome::Skipped("device is offline".to_string());
        }

        match self.client.infer(&turn.user_text).await {
            Ok(reply) => StrategyOutcome::Answered(Answer {
                category: reply.category,
                ..Answer::new(reply.response, ONLINE_CONFIDENCE)
            }),
            Err(e) if e.is_skip() => StrategyOutcome::Skipped(e.to_string()),
            Err(e) => StrategyOutcome::Failed(e.to_string()),
        }
    }
}

/// Local model generation over the full conversation
pub struct LocalGenerativeStrategy {
    lifecycle: Arc<ModelLifecycleManager>,
    max_tokens: usize,
}

impl LocalGenerativeStrategy {
    pub fn new(lifecycle: Arc<ModelLifecycleManager>, max_tokens: usize) -> Self {
        Self {
            lifecycle,
            max_tokens,
        }
    }
}

#[async_trait]
impl ResponseStrategy for LocalGenerativeStrategy {
    fn name(&self) -> &'static str {
        "local-generative"
    }

    fn provenance(&self) -> Provenance {
        Provenance::OfflineGenerative
    }

    async fn attempt(&self, turn: &Turn) -> StrategyOutcome {
        match self
            .lifecycle
            .generate_default(&turn.conversation, self.max_tokens)
            .await
        {
            Ok(text) if text.trim().is_empty() => {
                StrategyOutcome::Failed("local model produced no text".to_string())
            }
            Ok(text) => StrategyOutcome::Answered(Answer::new(text.trim(), GENERATIVE_CONFIDENCE)),
            Err(AssistError::ModelNotReady) => {
                StrategyOutcome::Skipped("no local model is ready".to_string())
            }
            Err(e) => StrategyOutcome::Failed(e.to_string()),
        }
    }
}

/// Keyword match against the static corpus
pub struct CorpusMatchStrategy {
    engine: Arc<OfflineEngine>,
}

impl CorpusMatchStrategy {
    pub fn new(engine: Arc<OfflineEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ResponseStrategy for CorpusMatchStrategy {
    fn name(&self) -> &'static str {
        "corpus-match"
    }

    fn provenance(&self) -> Provenance {
        Provenance::OfflineMatched
    }

    async fn attempt(&self, turn: &Turn) -> StrategyOutcome {
        if !self.engine.can_answer(&turn.user_text) {
            return StrategyOutcome::Skipped("query is outside the offline vocabulary".to_string());
        }

        let Some(result) = self.engine.match_query(&turn.user_text) else {
            return StrategyOutcome::Skipped("no corpus statement matched".to_string());
        };

        let related = self
            .engine
            .related_statements(&result.statement.category, result.statement.id)
            .into_iter()
            .map(|s| s.text)
            .collect();

        StrategyOutcome::Answered(Answer {
            text: result.statement.text,
            confidence: result.confidence,
            category: Some(result.statement.category),
            related,
        })
    }
}

/// Static guidance message; always answers
#[derive(Debug, Default)]
pub struct StaticFallbackStrategy;

impl StaticFallbackStrategy {
    /// Clinic referral for on-topic queries, offline notice otherwise
    pub fn answer(user_text: &str) -> Answer {
        let classification = classify(user_text);
        let on_topic = in_domain(user_text);
        debug!(category = classification.category, on_topic, "Falling back to static reply");
        let text = if on_topic {
            IN_DOMAIN_FALLBACK_TEXT
        } else {
            FALLBACK_TEXT
        };
        Answer {
            text: text.to_string(),
            confidence: FALLBACK_CONFIDENCE,
            category: Some(classification.category.to_string()),
            related: Vec::new(),
        }
    }
}

#[async_trait]
impl ResponseStrategy for StaticFallbackStrategy {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn provenance(&self) -> Provenance {
        Provenance::Fallback
    }

    async fn attempt(&self, turn: &Turn) -> StrategyOutcome {
        StrategyOutcome::Answered(Self::answer(&turn.user_text))
    }
}
