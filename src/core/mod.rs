//! Core module - Business logic
//!
//! Facts, decisions, storage, retrieval, conflict checks and the service
//! that ties them together.

pub mod conflict;
pub mod decision;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod fact;
pub mod pending;
pub mod search;
pub mod service;
pub mod similarity;
pub mod storage;
pub mod text;
