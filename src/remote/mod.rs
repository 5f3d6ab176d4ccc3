//! Remote language-model service module
//!
//! Provides the HTTP client backing embeddings, extraction and conflict
//! judgment when `[ai] provider = "openai"`.

mod client;
mod types;

pub use client::{parse_json_answer, AiClient};
pub use types::*;
