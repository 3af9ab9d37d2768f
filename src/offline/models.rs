//! Data models for offline answering

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// A pre-authored factual statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusStatement {
    pub id: u32,
    pub text: String,
    pub category: String,
    /// Lower-cased match terms
    #[serde(deserialize_with = "lowercase_terms")]
    pub keywords: BTreeSet<String>,
}

impl CorpusStatement {
    pub fn new(id: u32, text: &str, category: &str, keywords: &[&str]) -> Self {
        Self {
            id,
            text: text.to_string(),
            category: category.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }
}

fn lowercase_terms<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect())
}

/// Best corpus statement for a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub statement: CorpusStatement,
    pub score: u32,
    /// `min(score / 10, 1.0)`
    pub confidence: f32,
}

/// Topic label for a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub category: &'static str,
    pub confidence: f32,
}
