//! Atomic Fact Extractor (client side)
//!
//! Splits free text into candidate facts. The actual splitting is done by an
//! external service; this module owns the contract: the candidate type, the
//! validation of whatever the service returns, and the fallback used when it
//! fails.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::fact::Category;

/// Confidence assigned to the whole-text fallback candidate
pub const FALLBACK_CONFIDENCE: f32 = 0.5;

/// One statement proposed by the extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCandidate {
    pub statement: String,
    pub category: Category,
    pub entities: Vec<String>,
    pub confidence: f32,
}

impl FactCandidate {
    /// The whole input as one general fact at 0.5 confidence
    pub fn fallback(text: &str) -> Self {
        Self {
            statement: text.trim().to_string(),
            category: Category::General,
            entities: Vec::new(),
            confidence: FALLBACK_CONFIDENCE,
        }
    }
}

#[async_trait]
pub trait AtomicFactExtractor: Send + Sync {
    async fn extract(&self, text: &str, question: Option<&str>) -> Result<Vec<FactCandidate>>;

    fn name(&self) -> &str;
}

/// Validate an extractor response.
///
/// Accepts a bare array or an object with a `facts` array. Every candidate
/// needs a non-empty `statement`, a known `category`, an `entities` array
/// of strings and a `confidence` in [0, 1]. One bad candidate rejects the
/// whole response.
pub fn parse_candidates(value: &Value) -> Result<Vec<FactCandidate>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("facts") {
            Some(Value::Array(items)) => items,
            _ => anyhow::bail!("Extractor response has no `facts` array"),
        },
        _ => anyhow::bail!("Extractor response must be an array or object"),
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_candidate(item).map_err(|e| anyhow::anyhow!("candidate {}: {}", i, e)))
        .collect()
}

fn parse_candidate(item: &Value) -> Result<FactCandidate> {
    let obj = item
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("not an object"))?;

    let statement = obj
        .get("statement")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing statement"))?;

    let category: Category = obj
        .get("category")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("missing category"))?
        .parse()?;

    let entities = obj
        .get("entities")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow::anyhow!("missing entities"))?
        .iter()
        .map(|e| {
            e.as_str()
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("entity is not a string"))
        })
        .collect::<Result<Vec<_>>>()?;

    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow::anyhow!("missing confidence"))?;
    if !(0.0..=1.0).contains(&confidence) {
        anyhow::bail!("confidence {} out of range", confidence);
    }

    Ok(FactCandidate {
        statement: statement.to_string(),
        category,
        entities,
        confidence: confidence as f32,
    })
}

/// Run the extractor with a timeout.
///
/// Returns the candidates and whether the fallback was used. An error, a
/// timeout or an empty answer for non-empty text all fall back.
pub async fn extract_or_fallback(
    extractor: &dyn AtomicFactExtractor,
    text: &str,
    question: Option<&str>,
    timeout: Duration,
) -> (Vec<FactCandidate>, bool) {
    match tokio::time::timeout(timeout, extractor.extract(text, question)).await {
        Ok(Ok(candidates)) if !candidates.is_empty() => (candidates, false),
        Ok(Ok(_)) => {
            tracing::warn!(extractor = extractor.name(), "extractor returned nothing, using whole text");
            (vec![FactCandidate::fallback(text)], true)
        }
        Ok(Err(e)) => {
            tracing::warn!(extractor = extractor.name(), error = %e, "extraction failed, using whole text");
            (vec![FactCandidate::fallback(text)], true)
        }
        Err(_) => {
            tracing::warn!(extractor = extractor.name(), ?timeout, "extraction timed out, using whole text");
            (vec![FactCandidate::fallback(text)], true)
        }
    }
}

/// Offline extractor: one candidate per sentence.
///
/// Sentences shorter than `min_words` are skipped. Category is always
/// `general` and no entities are reported.
#[derive(Debug, Clone)]
pub struct SentenceExtractor {
    pub confidence: f32,
    pub min_words: usize,
}

impl Default for SentenceExtractor {
    fn default() -> Self {
        Self {
            confidence: 0.7,
            min_words: 3,
        }
    }
}

impl SentenceExtractor {
    pub fn split(&self, text: &str) -> Vec<FactCandidate> {
        sentences(text)
            .into_iter()
            .filter(|s| s.split_whitespace().count() >= self.min_words)
            .map(|s| FactCandidate {
                statement: s.to_string(),
                category: Category::General,
                entities: Vec::new(),
                confidence: self.confidence,
            })
            .collect()
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | ';')
}

/// A sentence ends at a line break, or at a terminator followed by
/// whitespace or the end of the text. "19.99" and "v2.1" stay whole.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let ends = c == '\n'
            || (is_terminator(c) && chars.peek().map_or(true, |(_, next)| next.is_whitespace()));
        if ends {
            out.push(text[start..i].trim().trim_end_matches(is_terminator));
            start = i + c.len_utf8();
        }
    }
    out.push(text[start..].trim().trim_end_matches(is_terminator));

    out
}

#[async_trait]
impl AtomicFactExtractor for SentenceExtractor {
    async fn extract(&self, text: &str, _question: Option<&str>) -> Result<Vec<FactCandidate>> {
        Ok(self.split(text))
    }

    fn name(&self) -> &str {
        "sentences"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Failing;

    #[async_trait]
    impl AtomicFactExtractor for Failing {
        async fn extract(&self, _text: &str, _q: Option<&str>) -> Result<Vec<FactCandidate>> {
            anyhow::bail!("rate limited")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_parse_candidates_array() {
        let v = json!([
            {"statement": "We ship from Leeds", "category": "manufacturing", "entities": ["Leeds"], "confidence": 0.9},
            {"statement": "Margins are thin", "category": "finance", "entities": [], "confidence": 0.4}
        ]);
        let c = parse_candidates(&v).unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c[0].category, Category::Manufacturing);
        assert_eq!(c[0].entities, vec!["Leeds"]);
        assert!((c[1].confidence - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_parse_candidates_wrapped() {
        let v = json!({"facts": [
            {"statement": "x y z", "category": "faq", "entities": [], "confidence": 1}
        ]});
        assert_eq!(parse_candidates(&v).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_candidates_rejects_bad_input() {
        // unknown category
        assert!(parse_candidates(&json!([
            {"statement": "x", "category": "gossip", "entities": [], "confidence": 0.9}
        ]))
        .is_err());
        // missing confidence
        assert!(parse_candidates(&json!([
            {"statement": "x", "category": "general", "entities": []}
        ]))
        .is_err());
        // out of range
        assert!(parse_candidates(&json!([
            {"statement": "x", "category": "general", "entities": [], "confidence": 7}
        ]))
        .is_err());
        // empty statement
        assert!(parse_candidates(&json!([
            {"statement": "  ", "category": "general", "entities": [], "confidence": 0.7}
        ]))
        .is_err());
        assert!(parse_candidates(&json!("We ship from Leeds")).is_err());
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_whole_text() {
        let (c, degraded) = extract_or_fallback(&Failing, " We ship from Leeds ", None, Duration::from_secs(1)).await;
        assert!(degraded);
        assert_eq!(c, vec![FactCandidate::fallback("We ship from Leeds")]);
        assert_eq!(c[0].confidence, FALLBACK_CONFIDENCE);
        assert_eq!(c[0].category, Category::General);
    }

    #[tokio::test]
    async fn test_sentence_extractor() {
        let (c, degraded) = extract_or_fallback(
            &SentenceExtractor::default(),
            "We ship from Leeds. Ok. Payroll runs every Friday!",
            None,
            Duration::from_secs(1),
        )
        .await;
        assert!(!degraded);
        let statements: Vec<_> = c.iter().map(|c| c.statement.as_str()).collect();
        assert_eq!(statements, vec!["We ship from Leeds", "Payroll runs every Friday"]);
    }

    #[test]
    fn test_sentence_split_keeps_decimals_whole() {
        let e = SentenceExtractor::default();
        let statements: Vec<_> = e
            .split("The base edition retails at 19.99 dollars in the US store. Version 2.1 ships in May")
            .into_iter()
            .map(|c| c.statement)
            .collect();
        assert_eq!(
            statements,
            vec![
                "The base edition retails at 19.99 dollars in the US store",
                "Version 2.1 ships in May",
            ]
        );
    }

    #[test]
    fn test_sentence_split_line_breaks_and_stacked_marks() {
        let e = SentenceExtractor::default();
        let statements: Vec<_> = e
            .split("Is the launch really on Monday?!\nThe office opens at 9.30 daily")
            .into_iter()
            .map(|c| c.statement)
            .collect();
        assert_eq!(
            statements,
            vec!["Is the launch really on Monday", "The office opens at 9.30 daily"]
        );
    }
}
