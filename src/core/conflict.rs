//! Conflict Resolver
//!
//! Decides what happens to a proposed fact given the team's relevant
//! existing facts: save it, supersede an existing fact with it, or park it
//! until a person confirms.
//!
//! The comparison itself is delegated to a [`ConflictJudge`] (a language
//! model, or the offline [`HeuristicJudge`]). Whatever the judge says is
//! passed through [`settle`], which applies the fixed policy:
//!
//! | judged as            | outcome                                         |
//! |----------------------|-------------------------------------------------|
//! | nothing to compare   | `save`                                          |
//! | byte-identical text  | `update` of the identical fact                  |
//! | duplicate            | `ask_confirmation`                              |
//! | contradiction        | `ask_confirmation`                              |
//! | correction of fact X | `update` X, or `ask_confirmation` if X unknown  |
//! | additive             | `save`                                          |
//! | judge failed         | `save` ("could not check conflicts")            |

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

use super::fact::{Fact, FactSummary, NewFact};
use super::text::{is_stopword, tokens};

pub const FAIL_OPEN_REASON: &str = "could not check conflicts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictAction {
    Save,
    Update,
    AskConfirmation,
}

impl std::fmt::Display for ConflictAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictAction::Save => write!(f, "save"),
            ConflictAction::Update => write!(f, "update"),
            ConflictAction::AskConfirmation => write!(f, "ask_confirmation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    None,
    Duplicate,
    Contradiction,
    Update,
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictType::None => write!(f, "none"),
            ConflictType::Duplicate => write!(f, "duplicate"),
            ConflictType::Contradiction => write!(f, "contradiction"),
            ConflictType::Update => write!(f, "update"),
        }
    }
}

impl std::str::FromStr for ConflictType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ConflictType::None),
            "duplicate" => Ok(ConflictType::Duplicate),
            "contradiction" => Ok(ConflictType::Contradiction),
            "update" => Ok(ConflictType::Update),
            _ => anyhow::bail!("Unknown conflict type: {}", s),
        }
    }
}

/// Final, policy-checked answer for one proposed fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictCheck {
    pub action: ConflictAction,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_fact_id: Option<Ulid>,
    pub conflict_type: ConflictType,
}

impl ConflictCheck {
    pub fn save(reason: impl Into<String>) -> Self {
        Self {
            action: ConflictAction::Save,
            reason: reason.into(),
            related_fact_id: None,
            conflict_type: ConflictType::None,
        }
    }

    pub fn fail_open() -> Self {
        Self::save(FAIL_OPEN_REASON)
    }
}

/// What a judge reported, before policy
#[derive(Debug, Clone, PartialEq)]
pub struct Judgment {
    pub action: ConflictAction,
    pub reason: String,
    pub related_fact_id: Option<Ulid>,
    pub conflict_type: ConflictType,
}

/// Judgment as it arrives over the wire. Unknown enum values fail to parse.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireJudgment {
    action: ConflictAction,
    reason: String,
    #[serde(default, alias = "related_fact_id")]
    related_fact_id: Option<String>,
    #[serde(alias = "conflict_type")]
    conflict_type: ConflictType,
}

impl Judgment {
    /// Validate a judge's JSON response.
    ///
    /// Every field except `relatedFactId` is required, enum values must be
    /// known, and `relatedFactId` must be a ULID when present.
    pub fn from_value(value: &Value) -> Result<Self> {
        let wire: WireJudgment = serde_json::from_value(value.clone())
            .map_err(|e| anyhow::anyhow!("Invalid judgment: {}", e))?;

        let related_fact_id = match wire.related_fact_id.as_deref().map(str::trim) {
            None | Some("") | Some("null") => None,
            Some(s) => Some(
                Ulid::from_string(s.trim_start_matches("fact-"))
                    .map_err(|_| anyhow::anyhow!("Invalid relatedFactId: {}", s))?,
            ),
        };

        Ok(Self {
            action: wire.action,
            reason: wire.reason,
            related_fact_id,
            conflict_type: wire.conflict_type,
        })
    }
}

/// Compares a proposed fact against existing ones
#[async_trait]
pub trait ConflictJudge: Send + Sync {
    async fn judge(&self, new_fact: &FactSummary, existing: &[FactSummary]) -> Result<Judgment>;

    fn name(&self) -> &str;
}

/// Apply the fixed outcome policy to a judge's answer.
///
/// `existing` must be the active facts the judge was shown.
pub fn settle(new_fact: &FactSummary, existing: &[FactSummary], judgment: Judgment) -> ConflictCheck {
    let known = |id: &Ulid| existing.iter().find(|f| f.id.as_ref() == Some(id));
    let related = judgment.related_fact_id.filter(|id| known(id).is_some());

    let ask = |reason: String, conflict_type: ConflictType| ConflictCheck {
        action: ConflictAction::AskConfirmation,
        reason,
        related_fact_id: related,
        conflict_type,
    };

    match (judgment.conflict_type, judgment.action) {
        (ConflictType::Contradiction, _) => ask(judgment.reason, ConflictType::Contradiction),

        (ConflictType::Duplicate, _) => {
            let identical = related
                .and_then(|id| known(&id))
                .is_some_and(|f| f.content == new_fact.content);
            if identical {
                ConflictCheck {
                    action: ConflictAction::Update,
                    reason: judgment.reason,
                    related_fact_id: related,
                    conflict_type: ConflictType::Duplicate,
                }
            } else {
                ask(judgment.reason, ConflictType::Duplicate)
            }
        }

        (ConflictType::Update, _) | (_, ConflictAction::Update) => match related {
            Some(id) => ConflictCheck {
                action: ConflictAction::Update,
                reason: judgment.reason,
                related_fact_id: Some(id),
                conflict_type: ConflictType::Update,
            },
            None => ask(
                format!("{} (fact to correct could not be identified)", judgment.reason),
                ConflictType::Update,
            ),
        },

        (ConflictType::None, ConflictAction::AskConfirmation) => ask(judgment.reason, ConflictType::None),

        (ConflictType::None, ConflictAction::Save) => ConflictCheck {
            action: ConflictAction::Save,
            reason: judgment.reason,
            related_fact_id: None,
            conflict_type: ConflictType::None,
        },
    }
}

/// Runs a judge with a timeout and the fail-open policy
#[derive(Clone)]
pub struct ConflictResolver {
    judge: Arc<dyn ConflictJudge>,
    timeout: Duration,
}

impl ConflictResolver {
    pub fn new(judge: Arc<dyn ConflictJudge>, timeout: Duration) -> Self {
        Self { judge, timeout }
    }

    pub fn judge_name(&self) -> &str {
        self.judge.name()
    }

    /// Classify `new_fact` against `existing`. Inactive facts are ignored.
    ///
    /// Never fails: a judge error or timeout yields `save`.
    pub async fn check_fact_conflict(&self, new_fact: &NewFact, existing: &[Fact]) -> ConflictCheck {
        let candidate = new_fact.summary();
        let active: Vec<FactSummary> = existing
            .iter()
            .filter(|f| f.is_active())
            .map(Fact::summary)
            .collect();

        if active.is_empty() {
            return ConflictCheck::save("no existing facts to compare");
        }

        if let Some(same) = active.iter().find(|f| f.content == candidate.content) {
            tracing::debug!(related = ?same.id, "identical fact already stored");
            return ConflictCheck {
                action: ConflictAction::Update,
                reason: "identical fact already stored".to_string(),
                related_fact_id: same.id,
                conflict_type: ConflictType::Duplicate,
            };
        }

        let judged = tokio::time::timeout(self.timeout, self.judge.judge(&candidate, &active)).await;
        let judgment = match judged {
            Ok(Ok(j)) => j,
            Ok(Err(e)) => {
                tracing::warn!(judge = self.judge.name(), error = %e, "conflict check failed, saving");
                return ConflictCheck::fail_open();
            }
            Err(_) => {
                tracing::warn!(judge = self.judge.name(), timeout = ?self.timeout, "conflict check timed out, saving");
                return ConflictCheck::fail_open();
            }
        };

        let check = settle(&candidate, &active, judgment);
        tracing::debug!(
            action = %check.action,
            conflict_type = %check.conflict_type,
            related = ?check.related_fact_id,
            "conflict check settled"
        );
        check
    }
}

// ============== Heuristic judge ==============

/// Phrases that mark a statement as a correction of something said before
const CORRECTION_MARKERS: &[&str] = &[
    "actually",
    "correction",
    "to correct",
    "no longer",
    "not anymore",
    "instead of",
    "rather than",
    "changed to",
    "changed from",
    "has changed",
    "was wrong",
    "update:",
    ", not ",
];

/// Marker words dropped from the subject comparison
const MARKER_WORDS: &[&str] = &[
    "actually", "correction", "correct", "not", "no", "longer", "anymore", "instead", "rather",
    "changed", "change", "wrong", "update", "now",
];

/// Offline judge based on structured fields and word overlap.
///
/// - same entity + attribute, different value: contradiction
/// - correction phrasing covering an existing fact's subject: update
/// - same wording with different numbers/dates: contradiction
/// - same wording and same numbers: duplicate
/// - anything else: additive
#[derive(Debug, Clone)]
pub struct HeuristicJudge {
    /// Minimum word-set Jaccard for two facts to be about the same subject
    pub subject_overlap: f32,
    /// Share of an existing fact's words a correction must mention
    pub correction_coverage: f32,
}

impl Default for HeuristicJudge {
    fn default() -> Self {
        Self {
            subject_overlap: 0.5,
            correction_coverage: 0.6,
        }
    }
}

struct Profile {
    words: BTreeSet<String>,
    values: BTreeSet<String>,
}

impl Profile {
    fn of(text: &str) -> Self {
        let mut words = BTreeSet::new();
        let mut values = BTreeSet::new();
        for token in tokens(text) {
            if token.chars().any(|c| c.is_ascii_digit()) {
                values.insert(token);
            } else if !is_stopword(&token) && !MARKER_WORDS.contains(&token.as_str()) {
                words.insert(token);
            }
        }
        Self { words, values }
    }

    fn jaccard(&self, other: &Profile) -> f32 {
        let union = self.words.union(&other.words).count();
        if union == 0 {
            return 0.0;
        }
        self.words.intersection(&other.words).count() as f32 / union as f32
    }

    /// Share of `other`'s words also present here
    fn coverage_of(&self, other: &Profile) -> f32 {
        if other.words.is_empty() {
            return 0.0;
        }
        other.words.intersection(&self.words).count() as f32 / other.words.len() as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Verdict {
    Additive,
    Duplicate,
    Contradiction,
    Correction,
}

fn norm(s: &Option<String>) -> Option<String> {
    s.as_deref()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

fn has_correction_marker(text: &str) -> bool {
    let lowered = format!(" {} ", text.to_lowercase());
    CORRECTION_MARKERS.iter().any(|m| lowered.contains(m))
}

impl HeuristicJudge {
    fn compare(&self, new: &FactSummary, new_profile: &Profile, old: &FactSummary) -> Verdict {
        let old_profile = Profile::of(&old.content);

        if has_correction_marker(&new.content)
            && new_profile.coverage_of(&old_profile) >= self.correction_coverage
        {
            return Verdict::Correction;
        }

        if let (Some(ne), Some(na), Some(oe), Some(oa)) = (
            norm(&new.entity_name),
            norm(&new.attribute),
            norm(&old.entity_name),
            norm(&old.attribute),
        ) {
            if ne == oe && na == oa {
                return match (norm(&new.value), norm(&old.value)) {
                    (Some(nv), Some(ov)) if nv != ov => Verdict::Contradiction,
                    (Some(_), Some(_)) => Verdict::Duplicate,
                    // Same subject, value unknown on one side
                    _ => Verdict::Contradiction,
                };
            }
        }

        if new_profile.jaccard(&old_profile) >= self.subject_overlap {
            if new_profile.values.is_empty() && old_profile.values.is_empty() {
                if new_profile.words == old_profile.words {
                    return Verdict::Duplicate;
                }
                return Verdict::Additive;
            }
            if new_profile.values != old_profile.values {
                return Verdict::Contradiction;
            }
            if new_profile.words == old_profile.words {
                return Verdict::Duplicate;
            }
        }

        Verdict::Additive
    }
}

#[async_trait]
impl ConflictJudge for HeuristicJudge {
    async fn judge(&self, new_fact: &FactSummary, existing: &[FactSummary]) -> Result<Judgment> {
        let profile = Profile::of(&new_fact.content);

        // Strongest verdict wins, earlier (more relevant) facts break ties
        let mut best: Option<(Verdict, &FactSummary)> = None;
        for old in existing {
            let verdict = self.compare(new_fact, &profile, old);
            if verdict == Verdict::Additive {
                continue;
            }
            if best.map_or(true, |(v, _)| verdict > v) {
                best = Some((verdict, old));
            }
        }

        let judgment = match best {
            None => Judgment {
                action: ConflictAction::Save,
                reason: "new information, no overlap with existing facts".to_string(),
                related_fact_id: None,
                conflict_type: ConflictType::None,
            },
            Some((Verdict::Correction, old)) => Judgment {
                action: ConflictAction::Update,
                reason: format!("corrects \"{}\"", old.content),
                related_fact_id: old.id,
                conflict_type: ConflictType::Update,
            },
            Some((Verdict::Contradiction, old)) => Judgment {
                action: ConflictAction::AskConfirmation,
                reason: format!("contradicts \"{}\"", old.content),
                related_fact_id: old.id,
                conflict_type: ConflictType::Contradiction,
            },
            Some((_, old)) => Judgment {
                action: ConflictAction::AskConfirmation,
                reason: format!("same claim as \"{}\"", old.content),
                related_fact_id: old.id,
                conflict_type: ConflictType::Duplicate,
            },
        };

        Ok(judgment)
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}
