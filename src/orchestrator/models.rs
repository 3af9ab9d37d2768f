//! Data models for response orchestration

use crate::conversation::Message;
use serde::Serialize;
use std::fmt;

/// Which path produced a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Online,
    OfflineGenerative,
    OfflineMatched,
    Fallback,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Online => "online",
            Provenance::OfflineGenerative => "offline-generative",
            Provenance::OfflineMatched => "offline-matched",
            Provenance::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single reply returned for one user message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantReply {
    pub text: String,
    pub provenance: Provenance,
    pub confidence: f32,
    pub category: Option<String>,
    /// "Did you mean" suggestions, corpus matches only
    pub related: Vec<String>,
}

/// Input shared by every strategy for one turn
#[derive(Debug, Clone)]
pub struct Turn {
    pub user_text: String,
    /// Conversation snapshot including the new user message
    pub conversation: Vec<Message>,
}

/// Text produced by a strategy
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub confidence: f32,
    pub category: Option<String>,
    pub related: Vec<String>,
}

impl Answer {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            category: None,
            related: Vec::new(),
        }
    }
}

/// Tagged result of one strategy attempt
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    Answered(Answer),
    /// Not applicable this turn; nothing was attempted
    Skipped(String),
    /// Attempted and failed
    Failed(String),
}
