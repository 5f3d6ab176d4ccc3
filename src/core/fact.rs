//! Fact - Core data structure
//!
//! A fact is one atomic, temporally-versioned statement about a team's
//! business. Facts are never deleted: an outdated fact gets `valid_until`
//! (and usually `superseded_by`) set, and the correction lives in a new row.
//!
//! # Key Properties
//! - **id**: ULID (sortable, unique)
//! - **team_id**: isolation partition, every query is scoped to one team
//! - **valid_until**: `None` while active, terminal once set
//! - **superseded_by**: link to the replacing fact (same team)
//! - **embedding**: optional vector, `None` means "not embedded"

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ulid::Ulid;

use super::error::StoreError;

/// Business area a fact belongs to (informational only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Product,
    Manufacturing,
    Marketing,
    Sales,
    Finance,
    People,
    Faq,
    #[default]
    General,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Product,
        Category::Manufacturing,
        Category::Marketing,
        Category::Sales,
        Category::Finance,
        Category::People,
        Category::Faq,
        Category::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Product => "product",
            Category::Manufacturing => "manufacturing",
            Category::Marketing => "marketing",
            Category::Sales => "sales",
            Category::Finance => "finance",
            Category::People => "people",
            Category::Faq => "faq",
            Category::General => "general",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| StoreError::validation(format!("unknown category: {}", s)))
    }
}

/// Where a fact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Typed in by a person
    #[default]
    Manual,
    /// Extracted from a chat conversation
    Conversation,
    /// Answer a teammate gave to an open question
    TeamAnswer,
    /// Document pulled in by an integration
    Integration,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Manual => write!(f, "manual"),
            SourceType::Conversation => write!(f, "conversation"),
            SourceType::TeamAnswer => write!(f, "team_answer"),
            SourceType::Integration => write!(f, "integration"),
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "manual" => Ok(SourceType::Manual),
            "conversation" => Ok(SourceType::Conversation),
            "team_answer" => Ok(SourceType::TeamAnswer),
            "integration" => Ok(SourceType::Integration),
            _ => Err(StoreError::validation(format!("unknown source type: {}", s))),
        }
    }
}

/// Provenance of a fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FactSource {
    pub source_type: SourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl FactSource {
    pub fn manual() -> Self {
        Self::default()
    }

    pub fn new(source_type: SourceType, source_id: Option<String>) -> Self {
        Self {
            source_type,
            source_id,
        }
    }
}

/// A stored fact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fact {
    /// Unique identifier (ULID)
    pub id: Ulid,

    /// Owning team
    pub team_id: String,

    /// The atomic statement
    pub content: String,

    pub category: Category,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Extractor confidence (0.0-1.0), 1.0 for manual entries
    pub confidence_score: f32,

    pub source: FactSource,

    /// Free-form side data (urls, dates mentioned, entities)
    #[serde(default = "empty_metadata")]
    pub metadata: Value,

    /// Embedding vector; never serialized to API output
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,

    pub valid_from: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<Ulid>,

    pub created_by: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn empty_metadata() -> Value {
    Value::Object(Map::new())
}

impl Fact {
    /// Build an active fact from a validated request
    pub fn from_new(team_id: impl Into<String>, new: NewFact) -> Self {
        let now = Utc::now();

        Self {
            id: Ulid::new(),
            team_id: team_id.into(),
            content: new.content.trim().to_string(),
            category: new.category,
            entity_type: new.entity_type,
            entity_name: new.entity_name,
            attribute: new.attribute,
            value: new.value,
            confidence_score: new.confidence.clamp(0.0, 1.0),
            source: new.source,
            metadata: new.metadata.unwrap_or_else(empty_metadata),
            embedding: new.embedding,
            valid_from: now,
            valid_until: None,
            superseded_by: None,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.valid_until.is_none()
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Get short ID (first 8 chars)
    pub fn short_id(&self) -> String {
        self.id.to_string()[..8].to_lowercase()
    }

    /// Compact view handed to the conflict judge
    pub fn summary(&self) -> FactSummary {
        FactSummary {
            id: Some(self.id),
            content: self.content.clone(),
            entity_name: self.entity_name.clone(),
            attribute: self.attribute.clone(),
            value: self.value.clone(),
        }
    }
}

impl std::fmt::Display for Fact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] ({}) {}", self.short_id(), self.category, self.content)
    }
}

/// Request to create a fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFact {
    pub content: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_name: Option<String>,
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub source: FactSource,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub metadata: Option<Value>,
    /// Pre-computed embedding; when absent the provider is asked
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

fn default_confidence() -> f32 {
    1.0
}

impl NewFact {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            category: Category::default(),
            entity_type: None,
            entity_name: None,
            attribute: None,
            value: None,
            confidence: default_confidence(),
            source: FactSource::default(),
            created_by: String::new(),
            metadata: None,
            embedding: None,
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_source(mut self, source: FactSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Structured decomposition, e.g. ("product", "Dungeon Crawlers", "launch date", "2025-03-22")
    pub fn with_subject(
        mut self,
        entity_type: impl Into<String>,
        entity_name: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_name = Some(entity_name.into());
        self.attribute = Some(attribute.into());
        self.value = Some(value.into());
        self
    }

    /// Reject malformed input before it reaches storage
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.content.trim().is_empty() {
            return Err(StoreError::validation("content must not be empty"));
        }
        if !self.confidence.is_finite() {
            return Err(StoreError::validation("confidence must be a finite number"));
        }
        if let Some(meta) = &self.metadata {
            if !meta.is_object() {
                return Err(StoreError::validation("metadata must be a JSON object"));
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> FactSummary {
        FactSummary {
            id: None,
            content: self.content.trim().to_string(),
            entity_name: self.entity_name.clone(),
            attribute: self.attribute.clone(),
            value: self.value.clone(),
        }
    }
}

/// In-place edit; validity and embedding are untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactUpdate {
    pub content: Option<String>,
    pub category: Option<Category>,
}

impl FactUpdate {
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.category.is_none()
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.is_empty() {
            return Err(StoreError::validation("nothing to update"));
        }
        if let Some(content) = &self.content {
            if content.trim().is_empty() {
                return Err(StoreError::validation("content must not be empty"));
            }
        }
        Ok(())
    }
}

/// What the conflict judge sees of a fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Ulid>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_new_is_active() {
        let fact = Fact::from_new("team-a", NewFact::new("  We ship from Leeds  "));

        assert_eq!(fact.team_id, "team-a");
        assert_eq!(fact.content, "We ship from Leeds");
        assert!(fact.is_active());
        assert!(fact.superseded_by.is_none());
        assert_eq!(fact.category, Category::General);
        assert_eq!(fact.confidence_score, 1.0);
        assert!(fact.metadata.is_object());
        assert_eq!(fact.valid_from, fact.created_at);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let fact = Fact::from_new("t", NewFact::new("x").with_confidence(1.7));
        assert_eq!(fact.confidence_score, 1.0);
    }

    #[test]
    fn test_validate_rejects_empty_content() {
        assert!(NewFact::new("   ").validate().is_err());
        assert!(NewFact::new("ok").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_object_metadata() {
        let new = NewFact::new("x").with_metadata(serde_json::json!(["a"]));
        assert!(new.validate().is_err());
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("Finance".parse::<Category>().unwrap(), Category::Finance);
        assert_eq!("faq".parse::<Category>().unwrap(), Category::Faq);
        assert!("astrology".parse::<Category>().is_err());
    }

    #[test]
    fn test_source_type_round_trips_through_display() {
        for st in [
            SourceType::Manual,
            SourceType::Conversation,
            SourceType::TeamAnswer,
            SourceType::Integration,
        ] {
            assert_eq!(st.to_string().parse::<SourceType>().unwrap(), st);
        }
        assert_eq!("team-answer".parse::<SourceType>().unwrap(), SourceType::TeamAnswer);
    }

    #[test]
    fn test_update_validation() {
        assert!(FactUpdate::default().validate().is_err());
        let blank = FactUpdate {
            content: Some(" ".into()),
            category: None,
        };
        assert!(blank.validate().is_err());
        let ok = FactUpdate {
            content: None,
            category: Some(Category::Sales),
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_embedding_not_serialized() {
        let fact = Fact::from_new("t", NewFact::new("x").with_embedding(vec![1.0, 2.0]));
        let json = serde_json::to_value(&fact).unwrap();
        assert!(json.get("embedding").is_none());
        assert!(fact.has_embedding());
    }

    #[test]
    fn test_unique_ids() {
        let a = Fact::from_new("t", NewFact::new("a"));
        let b = Fact::from_new("t", NewFact::new("b"));
        assert_ne!(a.id, b.id);
    }
}
