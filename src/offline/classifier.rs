//! Keyword-based topic classifier for user queries

use super::models::Classification;

/// Category assigned when no keyword matches
pub const DEFAULT_CATEGORY: &str = "General SRH";

const DEFAULT_CONFIDENCE: f32 = 0.0;
const MAX_CONFIDENCE: f32 = 0.8;

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("Legal Framework", &["legal", "law", "marriage", "age", "right"]),
    ("Rights & Principles", &["contraception", "access", "fundamental", "decision"]),
    ("Maternal Health", &["pregnant", "pregnancy", "maternal", "birth", "childbirth"]),
    ("Family Planning", &["family planning", "contraceptive", "birth control", "planning"]),
    ("HIV & STIs", &["hiv", "aids", "sti", "std", "virus"]),
    ("Adolescent Health", &["teen", "adolescent", "young", "youth"]),
    ("GBV & Rights", &["violence", "abuse", "gender", "rape", "fgm"]),
];

/// Label a query with the category of its most frequent keyword
///
/// Each keyword scores its occurrence count in the lower-cased query. The
/// first keyword in table order wins ties.
pub fn classify(query: &str) -> Classification {
    let query = query.to_lowercase();

    let mut best: Option<(&'static str, usize)> = None;
    for &(category, keywords) in CATEGORY_KEYWORDS {
        for keyword in keywords {
            let count = query.matches(*keyword).count();
            if count > best.map(|(_, c)| c).unwrap_or(0) {
                best = Some((category, count));
            }
        }
    }

    match best {
        Some((category, count)) => Classification {
            category,
            confidence: (count as f32 / 5.0).min(MAX_CONFIDENCE),
        },
        None => Classification {
            category: DEFAULT_CATEGORY,
            confidence: DEFAULT_CONFIDENCE,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_hiv() {
        let result = classify("How do I get an HIV test?");
        assert_eq!(result.category, "HIV & STIs");
        assert!((result.confidence - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_first_keyword_wins_ties() {
        // "marriage" (Legal Framework) and "pregnant" (Maternal Health) both occur once
        let result = classify("pregnant before marriage");
        assert_eq!(result.category, "Legal Framework");
    }

    #[test]
    fn test_repeated_keyword_raises_confidence() {
        let result = classify("hiv hiv hiv hiv hiv hiv");
        assert_eq!(result.category, "HIV & STIs");
        assert!((result.confidence - MAX_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[test]
    fn test_unmatched_query_uses_default() {
        let result = classify("where is the nearest bus stop");
        assert_eq!(result.category, DEFAULT_CATEGORY);
        assert_eq!(result.confidence, 0.0);
    }
}
