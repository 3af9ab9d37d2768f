//! Response orchestrator, the pipeline entry point
//!
//! Each user message runs through an ordered list of strategies. The first
//! one that answers produces the reply; every skip or failure before it is
//! logged with its reason. Transport and model errors never reach the
//! caller.

pub mod models;
pub mod strategy;

pub use models::{Answer, AssistantReply, Provenance, StrategyOutcome, Turn};
pub use strategy::{
    CorpusMatchStrategy, LocalGenerativeStrategy, OnlineStrategy, ResponseStrategy,
    StaticFallbackStrategy, FALLBACK_TEXT, IN_DOMAIN_FALLBACK_TEXT,
};

use crate::connectivity::ConnectivityMonitor;
use crate::conversation::{Role, SharedConversation};
use crate::error::{AssistError, Result};
use crate::metrics::METRICS;
use crate::model::ModelLifecycleManager;
use crate::offline::{classify, OfflineEngine};
use crate::remote::RemoteInferenceClient;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Serialises `respond` calls for one conversation
pub struct Orchestrator {
    conversation: SharedConversation,
    strategies: Vec<Box<dyn ResponseStrategy>>,
    in_flight: AtomicBool,
}

impl Orchestrator {
    pub fn new(conversation: SharedConversation, strategies: Vec<Box<dyn ResponseStrategy>>) -> Self {
        Self {
            conversation,
            strategies,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Online, then local generation, then corpus match, then static text
    ///
    /// The online step is left out when no remote client is configured.
    pub fn standard(
        conversation: SharedConversation,
        monitor: Arc<ConnectivityMonitor>,
        remote: Option<Arc<RemoteInferenceClient>>,
        lifecycle: Arc<ModelLifecycleManager>,
        engine: Arc<OfflineEngine>,
        max_tokens: usize,
    ) -> Self {
        let mut strategies: Vec<Box<dyn ResponseStrategy>> = Vec::with_capacity(4);
        if let Some(client) = remote {
            strategies.push(Box::new(OnlineStrategy::new(monitor, client)));
        }
        strategies.push(Box::new(LocalGenerativeStrategy::new(lifecycle, max_tokens)));
        strategies.push(Box::new(CorpusMatchStrategy::new(engine)));
        strategies.push(Box::new(StaticFallbackStrategy));

        Self::new(conversation, strategies)
    }

    pub fn conversation(&self) -> &SharedConversation {
        &self.conversation
    }

    /// Whether a `respond` call is currently running
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Produce exactly one reply for `user_text`
    ///
    /// Fails only with `InvalidArgument` for blank input or `Busy` while
    /// another call is still running.
    pub async fn respond(&self, user_text: &str) -> Result<AssistantReply> {
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return Err(AssistError::InvalidArgument("message is empty".to_string()));
        }

        let _flight = InFlight::acquire(&self.in_flight).ok_or_else(|| {
            METRICS.record_busy("respond");
            warn!("Rejected respond call while another is in flight");
            AssistError::Busy
        })?;

        let (_, epoch, snapshot) = self.conversation.append_and_snapshot(Role::User, user_text);
        let turn = Turn {
            user_text: user_text.to_string(),
            conversation: snapshot,
        };
        debug!(chars = user_text.len(), history = turn.conversation.len(), "Responding");

        let (answer, provenance) = self.run_strategies(&turn).await;
        let reply = AssistantReply {
            category: answer
                .category
                .or_else(|| Some(classify(user_text).category.to_string())),
            text: answer.text,
            provenance,
            confidence: answer.confidence,
            related: answer.related,
        };

        if self
            .conversation
            .append_if_epoch(epoch, Role::Assistant, reply.text.clone())
            .is_none()
        {
            info!("Conversation was reset during the turn; reply not recorded");
        }

        METRICS.record_response(provenance.as_str());
        info!(provenance = %provenance, confidence = reply.confidence, "Reply ready");
        Ok(reply)
    }

    async fn run_strategies(&self, turn: &Turn) -> (Answer, Provenance) {
        for strategy in &self.strategies {
            match strategy.attempt(turn).await {
                StrategyOutcome::Answered(answer) => return (answer, strategy.provenance()),
                StrategyOutcome::Skipped(reason) => {
                    warn!(strategy = strategy.name(), "Strategy skipped: {}", reason);
                    METRICS.record_strategy_miss(strategy.name(), false);
                }
                StrategyOutcome::Failed(reason) => {
                    warn!(strategy = strategy.name(), "Strategy failed: {}", reason);
                    METRICS.record_strategy_miss(strategy.name(), true);
                }
            }
        }

        (StaticFallbackStrategy::answer(&turn.user_text), Provenance::Fallback)
    }
}

/// Clears the in-flight flag when the call ends or is dropped
struct InFlight<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
