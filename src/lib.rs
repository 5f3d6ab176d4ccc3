//! teamfacts - team knowledge fact store
//!
//! Keeps what a team knows about its business as small, independently
//! verifiable facts.
//!
//! ## Key Concepts
//!
//! - **Atomic facts**: one statement each, with category, entity and confidence
//! - **Temporal validity**: facts are retired, never deleted; a correction
//!   supersedes the old version and the chain stays queryable
//! - **Hybrid retrieval**: embeddings first, then keywords, then recency
//! - **Conflict checks**: a new fact is saved, treated as an update, or parked
//!   until a person confirms it

pub mod cli;
pub mod config;
pub mod core;
pub mod remote;

pub use core::conflict::{ConflictAction, ConflictCheck, ConflictResolver};
pub use core::decision::{Decision, NewDecision};
pub use core::error::{StoreError, StoreResult};
pub use core::fact::{Category, Fact, NewFact};
pub use core::pending::{PendingConfirmation, PendingStore};
pub use core::search::{HybridSearch, KnowledgeResults, ScoredFact};
pub use core::service::{FactService, Proposal, ProposalOutcome, Resolution, ServiceOptions};
pub use core::storage::Storage;
pub use remote::AiClient;
