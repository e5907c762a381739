//! # memory-core
//!
//! The hybrid search-and-lifecycle engine:
//!
//! - `rewrite`: turns raw queries into OR-joined, prefix-wildcarded FTS
//!   match expressions plus the extracted term list
//! - `executor`: runs the match expression through the storage
//!   collaborator, applies structural filters, computes term coverage
//! - `scoring`: blends native relevance, coverage, importance, recency,
//!   and frequency into one deterministic composite rank
//! - `lifecycle`: pure importance/TTL/refresh/decay/prune policy
//! - `engine`: the store/recall/update/forget/prune operations, each
//!   transaction-scoped
//! - `format`: detail-level views and token budgeting
//! - `summary`: summary derivation and sensitive-content scrubbing

pub mod engine;
pub mod executor;
pub mod format;
pub mod lifecycle;
pub mod rewrite;
pub mod scoring;
pub mod summary;

pub use engine::{
    EntityRef, ForgetResponse, MemoryEngine, PruneReport, RecallOptions, RecallResponse,
    StoreInput, UpdateFields,
};
pub use executor::{Candidate, CandidateSet, SearchExecutor, SearchOptions};
pub use format::{DetailLevel, IndexEntry, MemoryView, TokenCounter};
pub use rewrite::{QueryRewriter, RewrittenQuery};
pub use scoring::{ScoredMemory, ScoringEngine};
