//! Search execution against the full-text index.
//!
//! The executor owns none of the ranking policy: it issues the rewritten
//! match expression through the storage collaborator, applies structural
//! filters as predicates, and computes the term-coverage fraction the
//! scoring engine needs. Its output ordering (native relevance) is
//! provisional.

use serde::{Deserialize, Serialize};
use tracing::debug;

use memory_store::{MemoryStore, SearchFilters};
use memory_types::{Memory, MemoryType, Result};

use crate::rewrite::RewrittenQuery;

/// Search filters and pagination.
///
/// `offset`/`min_importance`/`include_expired` are internal options, not
/// exposed at the outer recall boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Restrict to one memory type
    pub memory_type: Option<MemoryType>,
    /// Restrict to memories linked to any of these entity names
    pub entities: Vec<String>,
    /// Maximum detail results
    pub limit: usize,
    /// Ranked results to skip before the detail window
    pub offset: usize,
    /// Minimum stored importance
    pub min_importance: Option<f64>,
    /// Include soft-deleted and expired records (internal tooling only)
    pub include_expired: bool,
}

impl SearchOptions {
    pub fn new(limit: usize) -> Self {
        Self {
            memory_type: None,
            entities: Vec::new(),
            limit,
            offset: 0,
            min_importance: None,
            include_expired: false,
        }
    }

    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    pub fn with_entities(mut self, entities: Vec<String>) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_min_importance(mut self, min: f64) -> Self {
        self.min_importance = Some(min);
        self
    }

    pub fn include_expired(mut self) -> Self {
        self.include_expired = true;
        self
    }
}

/// One full-text candidate with the executor's raw signals.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub memory: Memory,
    /// Native relevance from the full-text engine, floored at zero
    pub relevance: f64,
    /// Fraction of extracted query terms literally present in the content
    pub coverage: f64,
}

/// The full candidate set (for index/summary use) plus its total count.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    pub candidates: Vec<Candidate>,
    pub total_count: usize,
    /// Terms the candidates were covered against
    pub terms: Vec<String>,
}

/// Executes rewritten queries through the storage collaborator.
pub struct SearchExecutor<'a> {
    store: &'a MemoryStore,
}

impl<'a> SearchExecutor<'a> {
    pub fn new(store: &'a MemoryStore) -> Self {
        Self { store }
    }

    /// Run the match expression and compute per-candidate coverage.
    ///
    /// Coverage is computed here rather than in the index because
    /// OR-matching alone cannot distinguish "matched 1 of 4 terms" from
    /// "matched 4 of 4". Deterministic for identical inputs and data.
    pub fn execute(
        &self,
        query: &RewrittenQuery,
        options: &SearchOptions,
        now_ms: i64,
    ) -> Result<CandidateSet> {
        let filters = SearchFilters {
            memory_type: options.memory_type,
            entities: options.entities.clone(),
            min_importance: options.min_importance,
            include_expired: options.include_expired,
        };

        let hits = self.store.search_fts(&query.match_expr, &filters, now_ms)?;
        let total_count = hits.len();

        let candidates = hits
            .into_iter()
            .map(|hit| {
                let coverage = term_coverage(&hit.memory.content, &query.terms);
                Candidate {
                    relevance: hit.relevance.max(0.0),
                    coverage,
                    memory: hit.memory,
                }
            })
            .collect();

        debug!(
            match_expr = %query.match_expr,
            candidates = total_count,
            "Search executed"
        );

        Ok(CandidateSet {
            candidates,
            total_count,
            terms: query.terms.clone(),
        })
    }
}

/// Fraction of distinct extracted terms present as case-insensitive
/// substrings of the content. Terms arrive already lowercased.
pub fn term_coverage(content: &str, terms: &[String]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let lower = content.to_lowercase();
    let matched = terms.iter().filter(|t| lower.contains(t.as_str())).count();
    matched as f64 / terms.len() as f64
}
