//! Search - Hybrid retrieval
//!
//! Vector similarity first, keyword containment when no vector ranking is
//! possible, most recent facts when the query has nothing to match on.
//! Only active facts are ever returned.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::decision::Decision;
use super::embedding::{embed_or_none, EmbeddingProvider};
use super::error::StoreResult;
use super::fact::Fact;
use super::similarity::top_k_similar;
use super::storage::{FactFilter, Storage};
use super::text::{estimate_tokens, search_terms};

/// Which path produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    Vector,
    Keyword,
    Recent,
}

impl std::fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RetrievalMode::Vector => "vector",
            RetrievalMode::Keyword => "keyword",
            RetrievalMode::Recent => "recent",
        };
        f.write_str(s)
    }
}

/// Search result with relevance score
///
/// `score` is the cosine similarity for vector hits, the fraction of query
/// terms found for keyword hits, and 0 for recent facts.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredFact {
    #[serde(flatten)]
    pub fact: Fact,
    pub score: f32,
    pub mode: RetrievalMode,
}

/// Facts and decisions for one query, side by side
#[derive(Debug, Clone, Default, Serialize)]
pub struct KnowledgeResults {
    pub facts: Vec<ScoredFact>,
    pub decisions: Vec<Decision>,
}

impl KnowledgeResults {
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.decisions.is_empty()
    }
}

/// Retrieval engine over one store and one embedding provider
#[derive(Clone)]
pub struct HybridSearch {
    storage: Arc<Storage>,
    embedder: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
    min_similarity: f32,
}

impl HybridSearch {
    pub fn new(storage: Arc<Storage>, embedder: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        Self {
            storage,
            embedder,
            timeout,
            min_similarity: 0.0,
        }
    }

    /// Vector hits scoring below this are dropped before the `limit` cut
    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    /// Rank active facts of `team_id` against `query`
    pub async fn search(&self, team_id: &str, query: &str, limit: usize) -> StoreResult<Vec<ScoredFact>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query_vec = embed_or_none(self.embedder.as_ref(), query, self.timeout).await;
        self.search_with_embedding(team_id, query, query_vec.as_deref(), limit)
    }

    /// Same as [`search`](Self::search) with the query vector already computed.
    /// `None` skips straight to the keyword path.
    pub fn search_with_embedding(
        &self,
        team_id: &str,
        query: &str,
        query_vec: Option<&[f32]>,
        limit: usize,
    ) -> StoreResult<Vec<ScoredFact>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        if let Some(query_vec) = query_vec {
            let hits = self.vector_search(team_id, query_vec, limit)?;
            if !hits.is_empty() {
                tracing::debug!(team_id, hits = hits.len(), "retrieval mode: vector");
                return Ok(hits);
            }
            tracing::debug!(team_id, "no vector hits, falling back to keywords");
        }

        let terms = search_terms(query);
        if !terms.is_empty() {
            let hits = self.keyword_search(team_id, &terms, limit)?;
            tracing::debug!(team_id, terms = terms.len(), hits = hits.len(), "retrieval mode: keyword");
            return Ok(hits);
        }

        tracing::debug!(team_id, "query has no usable terms, retrieval mode: recent");
        let recent = self
            .storage
            .list_facts(team_id, &FactFilter::default().with_limit(limit))?
            .into_iter()
            .map(|fact| ScoredFact {
                fact,
                score: 0.0,
                mode: RetrievalMode::Recent,
            })
            .collect();

        Ok(recent)
    }

    fn vector_search(&self, team_id: &str, query_vec: &[f32], limit: usize) -> StoreResult<Vec<ScoredFact>> {
        let facts = self.storage.embedded_active_facts(team_id)?;

        let candidates: Vec<(&Fact, &[f32])> = facts
            .iter()
            .filter_map(|f| f.embedding.as_deref().map(|e| (f, e)))
            .collect();

        let ranked = top_k_similar(query_vec, candidates, facts.len());

        Ok(ranked
            .into_iter()
            .filter(|(_, score)| *score >= self.min_similarity)
            .take(limit)
            .map(|(fact, score)| ScoredFact {
                fact: fact.clone(),
                score,
                mode: RetrievalMode::Vector,
            })
            .collect())
    }

    fn keyword_search(&self, team_id: &str, terms: &[String], limit: usize) -> StoreResult<Vec<ScoredFact>> {
        let facts = self.storage.keyword_facts(team_id, terms, limit)?;

        Ok(facts
            .into_iter()
            .map(|fact| {
                let content = fact.content.to_lowercase();
                let matched = terms.iter().filter(|t| content.contains(t.as_str())).count();
                ScoredFact {
                    score: matched as f32 / terms.len() as f32,
                    fact,
                    mode: RetrievalMode::Keyword,
                }
            })
            .collect())
    }

    /// Keyword match on `what`/`why`; most recent decisions when the query
    /// has no usable terms
    pub fn search_decisions(&self, team_id: &str, query: &str, limit: usize) -> StoreResult<Vec<Decision>> {
        let terms = search_terms(query);
        if terms.is_empty() {
            return self.storage.list_decisions(team_id, limit);
        }
        self.storage.keyword_decisions(team_id, &terms, limit)
    }

    /// Facts and decisions for `query`, not fused into one ranking
    pub async fn search_knowledge(&self, team_id: &str, query: &str, limit: usize) -> StoreResult<KnowledgeResults> {
        let facts = self.search(team_id, query, limit).await?;
        let decisions = self.search_decisions(team_id, query, limit)?;

        Ok(KnowledgeResults { facts, decisions })
    }
}

/// Render knowledge as a prompt-ready block, cut to `token_budget`.
///
/// Lines are added in rank order until the next one would exceed the
/// budget. Section headers count against it too.
pub fn render_context(results: &KnowledgeResults, token_budget: usize) -> String {
    let mut used = 0;
    let mut out = String::new();

    let mut push = |line: String, out: &mut String| -> bool {
        let cost = estimate_tokens(&line);
        if used + cost > token_budget {
            return false;
        }
        used += cost;
        out.push_str(&line);
        out.push('\n');
        true
    };

    if !results.facts.is_empty() && push("## Known facts".to_string(), &mut out) {
        for hit in &results.facts {
            let line = format!(
                "- [{}] {} (since {})",
                hit.fact.category,
                hit.fact.content,
                hit.fact.valid_from.format("%Y-%m-%d")
            );
            if !push(line, &mut out) {
                return out;
            }
        }
    }

    if !results.decisions.is_empty() && push("## Decisions".to_string(), &mut out) {
        for decision in &results.decisions {
            let mut line = format!("- {}", decision.what);
            if !decision.why.is_empty() {
                line.push_str(&format!(" (because {})", decision.why));
            }
            if !decision.alternatives.is_empty() {
                line.push_str(&format!("; rejected: {}", decision.alternatives.join(", ")));
            }
            if !push(line, &mut out) {
                break;
            }
        }
    }

    out
}
