//! Language-model service client
//!
//! One HTTP client for an OpenAI-compatible service, usable as embedding
//! provider, atomic fact extractor and conflict judge. Model answers are
//! requested as JSON objects and validated before use.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use url::Url;

use super::types::*;
use crate::config::AiConfig;
use crate::core::conflict::{ConflictJudge, Judgment};
use crate::core::embedding::EmbeddingProvider;
use crate::core::extractor::{parse_candidates, AtomicFactExtractor, FactCandidate};
use crate::core::fact::{Category, FactSummary};

const EXTRACT_PROMPT: &str = "You split business text into atomic facts. \
Each fact is one self-contained statement that stays true on its own. \
Answer with a JSON object {\"facts\": [...]} where every item has \
\"statement\" (string), \"category\" (one of: CATEGORIES), \
\"entities\" (array of strings) and \"confidence\" (number 0 to 1). \
Use low confidence for opinions, guesses and small talk.";

const JUDGE_PROMPT: &str = "You compare a proposed fact with a team's existing facts. \
Answer with a JSON object with \"action\" (save | update | ask_confirmation), \
\"conflictType\" (none | duplicate | contradiction | update), \"reason\" (short string) \
and \"relatedFactId\" (the id of the existing fact concerned, or null). \
Use update only when the new fact explicitly corrects an existing one. \
Use contradiction when both talk about the same subject with different values. \
When unsure between independent facts and a contradiction, choose contradiction \
with ask_confirmation.";

/// HTTP client for an OpenAI-compatible service
#[derive(Debug, Clone)]
pub struct AiClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    embedding_model: String,
    chat_model: String,
}

impl AiClient {
    /// Create new client from `[ai]` config
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            config.resolved_api_key(),
            &config.embedding_model,
            &config.chat_model,
            config.timeout(),
        )
    }

    /// Create new client with explicit parameters
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        embedding_model: &str,
        chat_model: &str,
        timeout: Duration,
    ) -> Result<Self> {
        // A trailing slash keeps the last path segment (`/v1`) on join
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url =
            Url::parse(&normalized).with_context(|| format!("Invalid AI service URL: {}", base_url))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            api_key,
            embedding_model: embedding_model.to_string(),
            chat_model: chat_model.to_string(),
        })
    }

    /// Build a URL for an endpoint
    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("Invalid endpoint path: {}", path))
    }

    /// Add auth header if a key is set
    fn auth_header(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref key) = self.api_key {
            builder.bearer_auth(key)
        } else {
            builder
        }
    }

    // ============== Endpoints ==============

    /// Embedding for one input
    pub async fn embedding(&self, text: &str) -> Result<Vec<f32>> {
        let url = self.url("embeddings")?;
        let req = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
        };

        let resp = self
            .auth_header(self.client.post(url))
            .json(&req)
            .send()
            .await
            .context("Failed to reach embedding endpoint")?;

        let body: EmbeddingResponse = self.handle_response(resp).await?;
        body.data
            .into_iter()
            .min_by_key(|d| d.index)
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow::anyhow!("Embedding response has no data"))
    }

    /// Chat completion whose answer must be a JSON value
    pub async fn chat_json(&self, system: &str, user: &str) -> Result<Value> {
        let url = self.url("chat/completions")?;
        let req = ChatRequest {
            model: &self.chat_model,
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: 0.0,
            response_format: ResponseFormat::json_object(),
        };

        let resp = self
            .auth_header(self.client.post(url))
            .json(&req)
            .send()
            .await
            .context("Failed to reach chat endpoint")?;

        let body: ChatResponse = self.handle_response(resp).await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat response has no choices"))?;

        parse_json_answer(&content)
    }

    // ============== Helpers ==============

    /// Handle response and deserialize
    async fn handle_response<T: serde::de::DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T> {
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            anyhow::bail!("AI service rejected the API key");
        }

        if !status.is_success() {
            let err = self.extract_error(resp).await;
            anyhow::bail!("AI service error ({}): {}", status, err);
        }

        resp.json().await.context("Failed to parse AI service response")
    }

    /// Extract error message from response
    async fn extract_error(&self, resp: reqwest::Response) -> String {
        if let Ok(err) = resp.json::<ApiErrorResponse>().await {
            err.error.message
        } else {
            "Unknown error".to_string()
        }
    }
}

/// Parse a model answer as JSON, tolerating a ```json fence around it
pub fn parse_json_answer(content: &str) -> Result<Value> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(unfenced).context("Model answer is not valid JSON")
}

fn extract_system_prompt() -> String {
    let categories: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
    EXTRACT_PROMPT.replace("CATEGORIES", &categories.join(", "))
}

fn extract_user_message(text: &str, question: Option<&str>) -> String {
    match question {
        Some(q) => format!("Question that was asked: {}\n\nAnswer to split:\n{}", q, text),
        None => format!("Text to split:\n{}", text),
    }
}

fn judge_user_message(new_fact: &FactSummary, existing: &[FactSummary]) -> String {
    json!({
        "newFact": new_fact,
        "existingFacts": existing,
    })
    .to_string()
}

#[async_trait]
impl EmbeddingProvider for AiClient {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        self.embedding(text).await.map(Some)
    }

    fn name(&self) -> &str {
        &self.embedding_model
    }
}

#[async_trait]
impl AtomicFactExtractor for AiClient {
    async fn extract(&self, text: &str, question: Option<&str>) -> Result<Vec<FactCandidate>> {
        let answer = self
            .chat_json(&extract_system_prompt(), &extract_user_message(text, question))
            .await?;
        parse_candidates(&answer)
    }

    fn name(&self) -> &str {
        &self.chat_model
    }
}

#[async_trait]
impl ConflictJudge for AiClient {
    async fn judge(&self, new_fact: &FactSummary, existing: &[FactSummary]) -> Result<Judgment> {
        let answer = self
            .chat_json(JUDGE_PROMPT, &judge_user_message(new_fact, existing))
            .await?;
        Judgment::from_value(&answer)
    }

    fn name(&self) -> &str {
        &self.chat_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conflict::{ConflictAction, ConflictType};

    fn client(base: &str) -> AiClient {
        AiClient::new(base, None, "embed-model", "chat-model", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_url_keeps_version_segment() -> Result<()> {
        let c = client("https://api.example.com/v1");
        assert_eq!(c.url("embeddings")?.as_str(), "https://api.example.com/v1/embeddings");
        assert_eq!(
            c.url("/chat/completions")?.as_str(),
            "https://api.example.com/v1/chat/completions"
        );
        Ok(())
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(AiClient::new("not a url", None, "e", "c", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_parse_json_answer() -> Result<()> {
        assert_eq!(parse_json_answer("{\"a\": 1}")?, json!({"a": 1}));
        assert_eq!(parse_json_answer("```json\n{\"a\": 1}\n```")?, json!({"a": 1}));
        assert!(parse_json_answer("Sure! Here you go").is_err());
        Ok(())
    }

    #[test]
    fn test_model_answers_go_through_validation() -> Result<()> {
        let answer = parse_json_answer(
            r#"{"action": "ask_confirmation", "conflictType": "contradiction",
                "reason": "7 vs 6", "relatedFactId": null}"#,
        )?;
        let judgment = Judgment::from_value(&answer)?;
        assert_eq!(judgment.action, ConflictAction::AskConfirmation);
        assert_eq!(judgment.conflict_type, ConflictType::Contradiction);

        let bad = parse_json_answer(r#"{"action": "merge", "conflictType": "none", "reason": ""}"#)?;
        assert!(Judgment::from_value(&bad).is_err());

        let facts = parse_json_answer(
            r#"{"facts": [{"statement": "We ship from Leeds", "category": "manufacturing",
                "entities": ["Leeds"], "confidence": 0.9}]}"#,
        )?;
        assert_eq!(parse_candidates(&facts)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_prompts() {
        let system = extract_system_prompt();
        assert!(system.contains("manufacturing"));
        assert!(!system.contains("CATEGORIES"));

        let user = extract_user_message("We ship from Leeds", Some("Where do we ship from?"));
        assert!(user.contains("Where do we ship from?"));

        let msg = judge_user_message(
            &FactSummary {
                id: None,
                content: "There are 6 dwarfs".into(),
                entity_name: None,
                attribute: None,
                value: None,
            },
            &[],
        );
        let v: Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(v["newFact"]["content"], "There are 6 dwarfs");
        assert_eq!(v["existingFacts"], json!([]));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_error() {
        // Port 9 (discard) is closed on test machines
        let c = client("http://127.0.0.1:9/v1");
        assert!(c.embedding("x").await.is_err());
        assert!(AtomicFactExtractor::extract(&c, "x", None).await.is_err());
    }
}
