//! Static statement corpus, built in or loaded from JSON once at startup

use super::models::CorpusStatement;
use crate::error::{AssistError, Result};
use std::path::Path;
use tracing::info;

/// Built-in statements used when no corpus file is configured
pub fn builtin() -> Vec<CorpusStatement> {
    vec![
        CorpusStatement::new(
            1,
            "The legal age for marriage in Liberia is 18 years for both boys and girls.",
            "Legal Framework",
            &["legal", "age", "marriage", "18", "years", "liberia"],
        ),
        CorpusStatement::new(
            2,
            "Access to contraception is a fundamental right for all individuals in Liberia.",
            "Rights & Principles",
            &["access", "contraception", "fundamental", "right", "individuals", "liberia"],
        ),
        CorpusStatement::new(
            3,
            "Every person has the right to decide freely if, when and how many children to have.",
            "Rights & Principles",
            &["right", "decide", "children", "how many", "when"],
        ),
        CorpusStatement::new(
            4,
            "Pregnant women should start antenatal care visits at a health facility as early as possible in the pregnancy.",
            "Maternal Health",
            &["pregnant", "pregnancy", "antenatal", "clinic", "visit", "check-up"],
        ),
        CorpusStatement::new(
            5,
            "Giving birth with a skilled health worker at a health facility makes childbirth safer for mother and baby.",
            "Maternal Health",
            &["birth", "childbirth", "deliver", "delivery", "midwife", "baby"],
        ),
        CorpusStatement::new(
            6,
            "Heavy bleeding, severe headache, blurred vision or fever during pregnancy are danger signs that need care at a clinic right away.",
            "Maternal Health",
            &["bleeding", "headache", "fever", "danger", "pregnancy", "sign"],
        ),
        CorpusStatement::new(
            7,
            "Family planning methods such as pills, injections, implants and condoms help people choose when to have children.",
            "Family Planning",
            &["family planning", "pill", "injection", "implant", "method", "contraceptive"],
        ),
        CorpusStatement::new(
            8,
            "Emergency contraception can prevent pregnancy when taken as soon as possible after unprotected sex.",
            "Family Planning",
            &["emergency", "morning after", "unprotected", "prevent", "pregnancy"],
        ),
        CorpusStatement::new(
            9,
            "Using a condom correctly every time you have sex greatly lowers the risk of HIV and other sexually transmitted infections.",
            "HIV & STIs",
            &["condom", "hiv", "sti", "infection", "protect", "sex"],
        ),
        CorpusStatement::new(
            10,
            "HIV testing is the only way to know your HIV status, and testing is available at health clinics.",
            "HIV & STIs",
            &["hiv", "test", "testing", "status", "aids"],
        ),
        CorpusStatement::new(
            11,
            "People living with HIV who take antiretroviral treatment every day can live long, healthy lives.",
            "HIV & STIs",
            &["hiv", "aids", "treatment", "antiretroviral", "arv", "medicine"],
        ),
        CorpusStatement::new(
            12,
            "Young people have the right to accurate information and friendly services about their sexual and reproductive health.",
            "Adolescent Health",
            &["young", "youth", "teen", "adolescent", "information", "services"],
        ),
        CorpusStatement::new(
            13,
            "Rape and sexual violence are crimes in Liberia, and survivors should get medical care within 72 hours.",
            "GBV & Rights",
            &["rape", "violence", "abuse", "survivor", "assault", "72"],
        ),
        CorpusStatement::new(
            14,
            "Female genital mutilation harms girls and women and violates their rights.",
            "GBV & Rights",
            &["fgm", "female genital", "mutilation", "cutting", "girls"],
        ),
        CorpusStatement::new(
            15,
            "People with HIV or other health conditions should be treated with respect and without stigma.",
            "Rights & Principles",
            &["stigma", "discrimination", "respect", "treated"],
        ),
    ]
}

/// Load statements from a JSON array of `{id, text, category, keywords}`
pub fn load_file(path: &Path) -> Result<Vec<CorpusStatement>> {
    let raw = std::fs::read_to_string(path)?;
    let statements: Vec<CorpusStatement> = serde_json::from_str(&raw).map_err(|e| {
        AssistError::Configuration(format!("invalid corpus file {}: {}", path.display(), e))
    })?;

    if statements.is_empty() {
        return Err(AssistError::Configuration(format!(
            "corpus file {} contains no statements",
            path.display()
        )));
    }

    info!("Loaded {} corpus statements from {}", statements.len(), path.display());
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::Write;

    #[test]
    fn test_builtin_ids_unique_and_keywords_lowercase() {
        let corpus = builtin();
        let ids: HashSet<u32> = corpus.iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), corpus.len());

        for statement in &corpus {
            assert!(!statement.keywords.is_empty());
            for keyword in &statement.keywords {
                assert_eq!(keyword, &keyword.to_lowercase());
            }
        }
    }

    #[test]
    fn test_load_file_lowercases_keywords() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": 7, "text": "Clinics offer free HIV tests.", "category": "HIV & STIs", "keywords": ["HIV", " Clinic ", ""]}}]"#
        )
        .unwrap();

        let corpus = load_file(file.path()).unwrap();
        assert_eq!(corpus.len(), 1);
        let keywords: Vec<&str> = corpus[0].keywords.iter().map(String::as_str).collect();
        assert_eq!(keywords, vec!["clinic", "hiv"]);
    }

    #[test]
    fn test_load_file_rejects_empty_and_malformed() {
        let mut empty = tempfile::NamedTempFile::new().unwrap();
        write!(empty, "[]").unwrap();
        assert!(matches!(load_file(empty.path()), Err(AssistError::Configuration(_))));

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, "{{not json").unwrap();
        assert!(matches!(load_file(bad.path()), Err(AssistError::Configuration(_))));
    }
}
