//! Fact service
//!
//! The operations callers use. Ties the store, the pending confirmations,
//! retrieval and the three external collaborators together.
//!
//! External calls (embedding, extraction, judgment) always happen before a
//! storage method is entered, so the connection lock is never held across
//! one of them.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use ulid::Ulid;

use super::conflict::{ConflictAction, ConflictCheck, ConflictJudge, ConflictResolver, ConflictType, HeuristicJudge};
use super::decision::{Decision, NewDecision};
use super::embedding::{embed_or_none, EmbeddingProvider, NoEmbeddings};
use super::error::{StoreError, StoreResult};
use super::extractor::{extract_or_fallback, AtomicFactExtractor, FactCandidate, SentenceExtractor};
use super::fact::{Fact, FactSource, FactUpdate, NewFact};
use super::pending::{PendingConfirmation, PendingStore};
use super::search::{render_context, HybridSearch, KnowledgeResults, ScoredFact};
use super::storage::{FactFilter, Storage, StorageStats};

/// Tunables for [`FactService`]
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Bound on every embedding, extraction and judgment call
    pub external_timeout: Duration,
    /// Extractor candidates below this are dropped
    pub min_confidence: f32,
    /// How many relevant facts the conflict judge sees
    pub conflict_candidates: usize,
    pub pending_ttl: Duration,
    /// Recompute the embedding when content is edited in place
    pub reembed_on_update: bool,
    pub min_similarity: f32,
    pub default_limit: usize,
    pub token_budget: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            external_timeout: Duration::from_secs(20),
            min_confidence: 0.6,
            conflict_candidates: 5,
            pending_ttl: Duration::from_secs(24 * 60 * 60),
            reembed_on_update: false,
            min_similarity: 0.0,
            default_limit: 10,
            token_budget: 2000,
        }
    }
}

/// One candidate that could not be stored
#[derive(Debug, Clone, Serialize)]
pub struct CandidateError {
    pub statement: String,
    pub error: String,
}

/// Result of `create_atomic_facts`
#[derive(Debug, Clone, Default, Serialize)]
pub struct AtomicBatchReport {
    pub created: Vec<Fact>,
    pub skipped_low_confidence: usize,
    pub errors: Vec<CandidateError>,
    /// The extractor failed and the whole text was used as one candidate
    pub extractor_degraded: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillReport {
    pub embedded: usize,
    pub failed: usize,
}

/// Store statistics plus the collaborators in use
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeStats {
    #[serde(flatten)]
    pub storage: StorageStats,
    pub pending_confirmations: usize,
    pub embedder: String,
    pub extractor: String,
    pub judge: String,
}

/// What happened to a proposed fact
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProposalOutcome {
    Saved { fact: Fact },
    Updated { fact: Fact, superseded: Fact },
    AwaitingUser { pending: PendingConfirmation },
    Discarded { pending: PendingConfirmation },
}

impl ProposalOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            ProposalOutcome::Saved { .. } => "saved",
            ProposalOutcome::Updated { .. } => "updated",
            ProposalOutcome::AwaitingUser { .. } => "awaiting_user",
            ProposalOutcome::Discarded { .. } => "discarded",
        }
    }
}

/// A proposed fact's conflict check and outcome
#[derive(Debug, Clone, Serialize)]
pub struct Proposal {
    pub check: ConflictCheck,
    #[serde(flatten)]
    pub outcome: ProposalOutcome,
}

/// A person's answer to a pending confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    ConfirmUpdate,
    SaveAnyway,
    Cancel,
}

impl FromStr for Resolution {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "confirm_update" | "confirm" | "update" => Ok(Resolution::ConfirmUpdate),
            "save_anyway" | "save" => Ok(Resolution::SaveAnyway),
            "cancel" | "discard" => Ok(Resolution::Cancel),
            _ => Err(StoreError::validation(format!("unknown resolution: {}", s))),
        }
    }
}

/// Entry point for every fact operation
#[derive(Clone)]
pub struct FactService {
    storage: Arc<Storage>,
    pending: Arc<PendingStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn AtomicFactExtractor>,
    resolver: ConflictResolver,
    search: HybridSearch,
    options: ServiceOptions,
}

impl FactService {
    /// Offline defaults: no embeddings, sentence extractor, heuristic judge
    pub fn new(storage: Arc<Storage>, pending: Arc<PendingStore>, options: ServiceOptions) -> Self {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(NoEmbeddings);
        let resolver = ConflictResolver::new(Arc::new(HeuristicJudge::default()), options.external_timeout);
        let search = HybridSearch::new(storage.clone(), embedder.clone(), options.external_timeout)
            .with_min_similarity(options.min_similarity);

        Self {
            storage,
            pending,
            embedder,
            extractor: Arc::new(SentenceExtractor::default()),
            resolver,
            search,
            options,
        }
    }

    /// In-memory store and pending set (for testing)
    pub fn open_memory() -> StoreResult<Self> {
        Ok(Self::new(
            Arc::new(Storage::open_memory()?),
            Arc::new(PendingStore::open_memory()?),
            ServiceOptions::default(),
        ))
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.search = HybridSearch::new(self.storage.clone(), embedder.clone(), self.options.external_timeout)
            .with_min_similarity(self.options.min_similarity);
        self.embedder = embedder;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn AtomicFactExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_judge(mut self, judge: Arc<dyn ConflictJudge>) -> Self {
        self.resolver = ConflictResolver::new(judge, self.options.external_timeout);
        self
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    // ============== Facts ==============

    /// Persist a new active fact.
    ///
    /// A failed embedding leaves the fact unembedded; it is still stored.
    pub async fn create_fact(&self, team_id: &str, mut new: NewFact) -> StoreResult<Fact> {
        validate_team(team_id)?;
        new.validate()?;

        if new.embedding.is_none() {
            new.embedding = embed_or_none(self.embedder.as_ref(), new.content.trim(), self.options.external_timeout).await;
        }

        let fact = Fact::from_new(team_id, new);
        self.storage.insert_fact(&fact)?;

        tracing::info!(team_id, id = %fact.id, embedded = fact.has_embedding(), "created fact");
        Ok(fact)
    }

    pub fn get_fact(&self, id: &Ulid) -> StoreResult<Fact> {
        self.storage
            .get_fact(id)?
            .ok_or_else(|| StoreError::fact_not_found(id))
    }

    /// Edit content or category in place; validity is untouched.
    ///
    /// The stored embedding is recomputed only with `reembed_on_update`,
    /// otherwise it keeps describing the previous content.
    pub async fn update_fact(&self, id: &Ulid, update: FactUpdate) -> StoreResult<Fact> {
        update.validate()?;

        let new_vector = match (&update.content, self.options.reembed_on_update) {
            (Some(content), true) => {
                embed_or_none(self.embedder.as_ref(), content.trim(), self.options.external_timeout).await
            }
            _ => None,
        };

        let mut fact = self.storage.update_fact(id, &update)?;

        if let Some(vector) = new_vector {
            self.storage.set_embedding(id, &vector)?;
            fact.embedding = Some(vector);
        } else if update.content.is_some() && fact.has_embedding() {
            tracing::debug!(id = %id, "content edited, embedding left as is");
        }

        tracing::info!(id = %id, "updated fact");
        Ok(fact)
    }

    /// Retire a fact. Retiring an inactive fact is a no-op.
    pub fn invalidate_fact(&self, id: &Ulid, superseded_by: Option<&Ulid>) -> StoreResult<Fact> {
        let fact = self.storage.invalidate_fact(id, superseded_by)?;
        tracing::info!(id = %id, superseded_by = ?fact.superseded_by, "invalidated fact");
        Ok(fact)
    }

    pub fn get_facts(&self, team_id: &str, filter: &FactFilter) -> StoreResult<Vec<Fact>> {
        self.storage.list_facts(team_id, filter)
    }

    /// Replace `old_id` with a new fact in one transaction
    pub async fn supersede_fact(&self, team_id: &str, old_id: &Ulid, mut new: NewFact) -> StoreResult<(Fact, Fact)> {
        validate_team(team_id)?;
        new.validate()?;

        if new.embedding.is_none() {
            new.embedding = embed_or_none(self.embedder.as_ref(), new.content.trim(), self.options.external_timeout).await;
        }

        let fact = Fact::from_new(team_id, new);
        let (fact, old) = self.storage.supersede(old_id, &fact)?;

        tracing::info!(team_id, id = %fact.id, superseded = %old.id, "superseded fact");
        Ok((fact, old))
    }

    /// Supersession chain through `id`, oldest first
    pub fn get_history(&self, id: &Ulid) -> StoreResult<Vec<Fact>> {
        self.storage.history_chain(id)
    }

    /// Extract candidates from `text` and store those confident enough.
    ///
    /// Candidates are created concurrently and independently; one failing
    /// does not stop the others.
    pub async fn create_atomic_facts(
        &self,
        team_id: &str,
        text: &str,
        source: FactSource,
        question: Option<&str>,
        created_by: &str,
    ) -> StoreResult<AtomicBatchReport> {
        validate_team(team_id)?;
        if text.trim().is_empty() {
            return Err(StoreError::validation("text must not be empty"));
        }

        let (candidates, degraded) =
            extract_or_fallback(self.extractor.as_ref(), text, question, self.options.external_timeout).await;

        let total = candidates.len();
        let keep: Vec<FactCandidate> = candidates
            .into_iter()
            .filter(|c| c.confidence >= self.options.min_confidence)
            .collect();
        let skipped_low_confidence = total - keep.len();

        let creations = keep.iter().map(|candidate| {
            let new = candidate_to_fact(candidate, &source, question, created_by);
            self.create_fact(team_id, new)
        });
        let results = join_all(creations).await;

        let mut report = AtomicBatchReport {
            skipped_low_confidence,
            extractor_degraded: degraded,
            ..Default::default()
        };
        for (candidate, result) in keep.iter().zip(results) {
            match result {
                Ok(fact) => report.created.push(fact),
                Err(e) => {
                    tracing::warn!(team_id, statement = %candidate.statement, error = %e, "failed to store candidate");
                    report.errors.push(CandidateError {
                        statement: candidate.statement.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            team_id,
            created = report.created.len(),
            skipped = report.skipped_low_confidence,
            errors = report.errors.len(),
            degraded,
            "atomic facts batch done"
        );
        Ok(report)
    }

    /// Embed active facts that have no vector yet, up to `limit`
    pub async fn backfill_embeddings(&self, team_id: &str, limit: usize) -> StoreResult<BackfillReport> {
        let missing = self.storage.facts_missing_embedding(team_id, limit)?;
        let mut report = BackfillReport::default();

        for fact in missing {
            match embed_or_none(self.embedder.as_ref(), &fact.content, self.options.external_timeout).await {
                Some(vector) => {
                    self.storage.set_embedding(&fact.id, &vector)?;
                    report.embedded += 1;
                }
                None => report.failed += 1,
            }
        }

        tracing::info!(team_id, embedded = report.embedded, failed = report.failed, "backfill done");
        Ok(report)
    }

    pub fn stats(&self, team_id: &str) -> StoreResult<KnowledgeStats> {
        Ok(KnowledgeStats {
            storage: self.storage.stats(team_id)?,
            pending_confirmations: self.pending.count_for_team(team_id)?,
            embedder: self.embedder.name().to_string(),
            extractor: self.extractor.name().to_string(),
            judge: self.resolver.judge_name().to_string(),
        })
    }

    // ============== Retrieval ==============

    pub async fn search_facts(&self, team_id: &str, query: &str, limit: Option<usize>) -> StoreResult<Vec<ScoredFact>> {
        let limit = limit.unwrap_or(self.options.default_limit);
        self.search.search(team_id, query, limit).await
    }

    pub async fn search_knowledge(
        &self,
        team_id: &str,
        query: &str,
        limit: Option<usize>,
    ) -> StoreResult<KnowledgeResults> {
        let limit = limit.unwrap_or(self.options.default_limit);
        self.search.search_knowledge(team_id, query, limit).await
    }

    /// Knowledge for `query` rendered for a prompt
    pub async fn get_knowledge_context(
        &self,
        team_id: &str,
        query: &str,
        limit: Option<usize>,
        token_budget: Option<usize>,
    ) -> StoreResult<String> {
        let results = self.search_knowledge(team_id, query, limit).await?;
        Ok(render_context(&results, token_budget.unwrap_or(self.options.token_budget)))
    }

    // ============== Decisions ==============

    pub fn create_decision(&self, team_id: &str, new: NewDecision) -> StoreResult<Decision> {
        validate_team(team_id)?;
        new.validate()?;

        let decision = Decision::from_new(team_id, new);
        self.storage.insert_decision(&decision)?;

        tracing::info!(team_id, id = %decision.id, "recorded decision");
        Ok(decision)
    }

    pub fn get_decisions(&self, team_id: &str, limit: usize) -> StoreResult<Vec<Decision>> {
        self.storage.list_decisions(team_id, limit)
    }

    // ============== Conflict-checked writes ==============

    /// Check `new` against the most relevant active facts and act on it:
    /// save, supersede, or park it under `key` for a person to decide.
    pub async fn propose_fact(&self, team_id: &str, mut new: NewFact, key: Option<&str>) -> StoreResult<Proposal> {
        validate_team(team_id)?;
        new.validate()?;

        if new.embedding.is_none() {
            new.embedding = embed_or_none(self.embedder.as_ref(), new.content.trim(), self.options.external_timeout).await;
        }

        // The proposal's own vector doubles as the query vector
        let related: Vec<Fact> = self
            .search
            .search_with_embedding(
                team_id,
                new.content.trim(),
                new.embedding.as_deref(),
                self.options.conflict_candidates,
            )?
            .into_iter()
            .map(|hit| hit.fact)
            .collect();

        let check = self.resolver.check_fact_conflict(&new, &related).await;

        let outcome = match (check.action, check.related_fact_id) {
            (ConflictAction::Save, _) => ProposalOutcome::Saved {
                fact: self.create_fact(team_id, new).await?,
            },
            (ConflictAction::Update, Some(old_id)) => match self.supersede_fact(team_id, &old_id, new.clone()).await {
                Ok((fact, superseded)) => ProposalOutcome::Updated { fact, superseded },
                // Retired between the judgment and the write: let a person decide
                Err(e) if e.is_already_retired() => self.park(
                    team_id,
                    key,
                    new,
                    None,
                    check.conflict_type,
                    format!("{}; that fact has since been retired", check.reason),
                )?,
                Err(e) => return Err(e),
            },
            (ConflictAction::Update, None) | (ConflictAction::AskConfirmation, _) => self.park(
                team_id,
                key,
                new,
                check.related_fact_id,
                check.conflict_type,
                check.reason.clone(),
            )?,
        };

        Ok(Proposal { check, outcome })
    }

    fn park(
        &self,
        team_id: &str,
        key: Option<&str>,
        new: NewFact,
        related_fact_id: Option<Ulid>,
        conflict_type: ConflictType,
        reason: String,
    ) -> StoreResult<ProposalOutcome> {
        let key = key.map(str::to_string).unwrap_or_else(|| Ulid::new().to_string());
        let pending = PendingConfirmation::new(
            key,
            team_id,
            new,
            related_fact_id,
            conflict_type,
            reason,
            self.options.pending_ttl,
        );
        self.pending.put(&pending)?;

        tracing::info!(team_id, key = %pending.key, %conflict_type, "fact awaiting confirmation");
        Ok(ProposalOutcome::AwaitingUser { pending })
    }

    /// Unexpired confirmations for a team, newest first
    pub fn list_pending(&self, team_id: &str) -> StoreResult<Vec<PendingConfirmation>> {
        self.pending.purge_expired()?;
        self.pending.list_for_team(team_id)
    }

    pub fn get_pending(&self, team_id: &str, key: &str) -> StoreResult<PendingConfirmation> {
        self.pending
            .get(team_id, key)?
            .ok_or_else(|| pending_not_found(key))
    }

    /// Apply a person's answer to a pending confirmation of `team_id`.
    ///
    /// Unknown and expired keys are `NotFound`. The entry is consumed only
    /// when the answer can be applied.
    pub async fn resolve_pending(&self, team_id: &str, key: &str, resolution: Resolution) -> StoreResult<ProposalOutcome> {
        let peek = self.get_pending(team_id, key)?;
        if resolution == Resolution::ConfirmUpdate {
            let Some(old_id) = peek.related_fact_id else {
                return Err(StoreError::validation(
                    "no existing fact to update; save anyway or cancel",
                ));
            };
            if !self.get_fact(&old_id)?.is_active() {
                return Err(StoreError::AlreadyRetired(old_id.to_string()));
            }
        }

        let pending = self
            .pending
            .take(team_id, key)?
            .ok_or_else(|| pending_not_found(key))?;

        let outcome = match (resolution, pending.related_fact_id) {
            (Resolution::ConfirmUpdate, Some(old_id)) => {
                let (fact, superseded) = self
                    .supersede_fact(&pending.team_id, &old_id, pending.proposed.clone())
                    .await?;
                ProposalOutcome::Updated { fact, superseded }
            }
            (Resolution::ConfirmUpdate, None) | (Resolution::SaveAnyway, _) => ProposalOutcome::Saved {
                fact: self.create_fact(&pending.team_id, pending.proposed.clone()).await?,
            },
            (Resolution::Cancel, _) => {
                tracing::info!(team_id, key, "discarded proposed fact");
                ProposalOutcome::Discarded { pending }
            }
        };

        Ok(outcome)
    }
}

fn validate_team(team_id: &str) -> StoreResult<()> {
    if team_id.trim().is_empty() {
        return Err(StoreError::validation("team id must not be empty"));
    }
    Ok(())
}

fn pending_not_found(key: &str) -> StoreError {
    StoreError::NotFound {
        kind: "pending confirmation",
        id: key.to_string(),
    }
}

fn candidate_to_fact(candidate: &FactCandidate, source: &FactSource, question: Option<&str>, created_by: &str) -> NewFact {
    let mut metadata = json!({ "entities": candidate.entities });
    if let (Some(q), Value::Object(map)) = (question, &mut metadata) {
        map.insert("question".to_string(), Value::String(q.to_string()));
    }

    NewFact::new(candidate.statement.clone())
        .with_category(candidate.category)
        .with_confidence(candidate.confidence)
        .with_source(source.clone())
        .with_created_by(created_by)
        .with_metadata(metadata)
}
