//! Decision - "what was decided and why"
//!
//! Decisions have no versioning. They exist as context that gets returned
//! next to facts by `search_knowledge`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::error::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub id: Ulid,
    pub team_id: String,
    pub what: String,
    #[serde(default)]
    pub why: String,
    #[serde(default)]
    pub alternatives: Vec<String>,
    pub made_by: String,
    #[serde(default)]
    pub related_facts: Vec<Ulid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDecision {
    pub what: String,
    #[serde(default)]
    pub why: String,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub made_by: String,
    #[serde(default)]
    pub related_facts: Vec<Ulid>,
}

impl NewDecision {
    pub fn new(what: impl Into<String>, why: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            why: why.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.what.trim().is_empty() {
            return Err(StoreError::validation("decision must say what was decided"));
        }
        Ok(())
    }
}

impl Decision {
    pub fn from_new(team_id: impl Into<String>, new: NewDecision) -> Self {
        Self {
            id: Ulid::new(),
            team_id: team_id.into(),
            what: new.what.trim().to_string(),
            why: new.why.trim().to_string(),
            alternatives: new.alternatives,
            made_by: new.made_by,
            related_facts: new.related_facts,
            created_at: Utc::now(),
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.why.is_empty() {
            write!(f, "{}", self.what)
        } else {
            write!(f, "{} (because {})", self.what, self.why)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_what() {
        assert!(NewDecision::new("", "cheaper").validate().is_err());
        assert!(NewDecision::new("Use Stripe", "").validate().is_ok());
    }

    #[test]
    fn test_display() {
        let d = Decision::from_new("t", NewDecision::new("Use Stripe", "lower fees"));
        assert_eq!(d.to_string(), "Use Stripe (because lower fees)");
    }
}
