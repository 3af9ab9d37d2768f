//! Offline response engine
//!
//! Answers queries without any generative model by scoring them against a
//! small static corpus of domain statements.

pub mod classifier;
pub mod corpus;
pub mod models;

pub use classifier::classify;
pub use models::{Classification, CorpusStatement, MatchResult};

use crate::config::CorpusConfig;
use crate::error::Result;
use tracing::debug;

/// Bonus for a query that contains the full statement text
const VERBATIM_BONUS: u32 = 5;

/// Maximum number of related statements suggested with a match
const MAX_RELATED: usize = 3;

/// Terms that mark a query as within the assistant's domain
const DOMAIN_VOCABULARY: &[&str] = &[
    "hiv",
    "aids",
    "contraception",
    "family planning",
    "pregnancy",
    "maternal",
    "health",
    "reproductive",
    "sexual",
    "marriage",
    "age",
    "rights",
    "liberia",
    "stigma",
    "prevention",
    "treatment",
    "care",
    "clinics",
    "services",
];

/// Whether the query mentions anything in the domain vocabulary
pub fn in_domain(query: &str) -> bool {
    let query = query.to_lowercase();
    DOMAIN_VOCABULARY.iter().any(|term| query.contains(*term))
}

/// Score a lower-cased query against one statement
///
/// One point per keyword found as a substring, plus a bonus when the
/// statement text itself appears in the query.
pub fn score(query_lower: &str, statement: &CorpusStatement) -> u32 {
    let keyword_hits = statement
        .keywords
        .iter()
        .filter(|keyword| query_lower.contains(keyword.as_str()))
        .count() as u32;

    let verbatim = if query_lower.contains(&statement.text.to_lowercase()) {
        VERBATIM_BONUS
    } else {
        0
    };

    keyword_hits + verbatim
}

/// Highest-scoring statement, first in corpus order on ties
///
/// Returns `None` when nothing scores above zero.
pub fn best_match(query: &str, corpus: &[CorpusStatement]) -> Option<MatchResult> {
    let query_lower = query.to_lowercase();

    let mut best: Option<(&CorpusStatement, u32)> = None;
    for statement in corpus {
        let s = score(&query_lower, statement);
        if s > best.map(|(_, b)| b).unwrap_or(0) {
            best = Some((statement, s));
        }
    }

    best.map(|(statement, score)| MatchResult {
        statement: statement.clone(),
        score,
        confidence: (score as f32 / 10.0).min(1.0),
    })
}

/// Corpus-backed answering
#[derive(Debug, Clone)]
pub struct OfflineEngine {
    corpus: Vec<CorpusStatement>,
}

impl OfflineEngine {
    pub fn new(corpus: Vec<CorpusStatement>) -> Self {
        Self { corpus }
    }

    /// Engine over the built-in statements
    pub fn builtin() -> Self {
        Self::new(corpus::builtin())
    }

    /// Engine over the configured corpus file, or the built-in one
    pub fn from_config(config: &CorpusConfig) -> Result<Self> {
        match &config.path {
            Some(path) => Ok(Self::new(corpus::load_file(path)?)),
            None => Ok(Self::builtin()),
        }
    }

    pub fn corpus(&self) -> &[CorpusStatement] {
        &self.corpus
    }

    /// Best statement for a query, if any scores above zero
    pub fn match_query(&self, query: &str) -> Option<MatchResult> {
        let result = best_match(query, &self.corpus);
        match &result {
            Some(m) => debug!(statement_id = m.statement.id, score = m.score, "Corpus match"),
            None => debug!("No corpus statement matched"),
        }
        result
    }

    /// Up to three other statements in the same category
    pub fn related_statements(&self, category: &str, exclude_id: u32) -> Vec<CorpusStatement> {
        self.corpus
            .iter()
            .filter(|s| s.category == category && s.id != exclude_id)
            .take(MAX_RELATED)
            .cloned()
            .collect()
    }

    pub fn can_answer(&self, query: &str) -> bool {
        in_domain(query)
    }
}

impl Default for OfflineEngine {
    fn default() -> Self {
        Self::builtin()
    }
}
