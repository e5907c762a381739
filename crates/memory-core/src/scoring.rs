//! Composite ranking.
//!
//! Blends the executor's raw signals with lifecycle outputs into one
//! composite score per candidate:
//!
//! ```text
//! score = (w_rel * rel_norm + w_cov * coverage + w_imp * eff_importance/10
//!          + w_rec * recency + w_freq * frequency) / sum(weights)
//! ```
//!
//! Every signal is normalized to [0, 1] before weighting. Output order is
//! fully deterministic: composite desc, then importance desc, then
//! last_accessed desc, then id asc (ids are creation-ordered ULIDs).

use std::cmp::Ordering;

use memory_types::{LifecycleSettings, Memory, ScoringWeights};

use crate::executor::{Candidate, CandidateSet};
use crate::lifecycle;

/// A candidate with its composite score and the signals behind it.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: Memory,
    /// Composite rank in [0, 1]
    pub score: f64,
    /// Normalized native relevance
    pub relevance: f64,
    /// Term-coverage fraction
    pub coverage: f64,
}

/// Combines raw search signals into a stable ranked list.
pub struct ScoringEngine {
    weights: ScoringWeights,
    lifecycle: LifecycleSettings,
}

impl ScoringEngine {
    pub fn new(weights: ScoringWeights, lifecycle: LifecycleSettings) -> Self {
        Self { weights, lifecycle }
    }

    /// Rank a candidate set, consuming it.
    pub fn rank(&self, set: CandidateSet, now_ms: i64) -> Vec<ScoredMemory> {
        let max_relevance = set
            .candidates
            .iter()
            .map(|c| c.relevance)
            .fold(0.0_f64, f64::max);

        let mut scored: Vec<ScoredMemory> = set
            .candidates
            .into_iter()
            .map(|c| self.score_candidate(c, max_relevance, now_ms))
            .collect();

        scored.sort_by(|a, b| {
            compare_desc(a.score, b.score)
                .then_with(|| compare_desc(a.memory.importance, b.memory.importance))
                .then_with(|| b.memory.last_accessed.cmp(&a.memory.last_accessed))
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        scored
    }

    fn score_candidate(&self, candidate: Candidate, max_relevance: f64, now_ms: i64) -> ScoredMemory {
        let Candidate {
            memory,
            relevance,
            coverage,
        } = candidate;

        let rel_norm = if max_relevance > 0.0 {
            (relevance / max_relevance).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let idle_days = memory.idle_days(now_ms);
        let importance_signal =
            lifecycle::effective_importance(memory.importance, idle_days) / lifecycle::IMPORTANCE_MAX;
        let recency = 1.0 / (1.0 + idle_days / self.lifecycle.recency_half_life_days);
        let frequency = frequency_signal(memory.access_count, self.lifecycle.frequency_cap);

        let w = &self.weights;
        let score = (w.relevance * rel_norm
            + w.coverage * coverage
            + w.importance * importance_signal
            + w.recency * recency
            + w.frequency * frequency)
            / w.total();

        ScoredMemory {
            memory,
            score,
            relevance: rel_norm,
            coverage,
        }
    }
}

/// Diminishing-returns frequency signal: logarithmic growth, capped at 1.
fn frequency_signal(access_count: i64, cap: i64) -> f64 {
    let n = access_count.max(0) as f64;
    let cap = cap.max(1) as f64;
    (n.ln_1p() / cap.ln_1p()).min(1.0)
}

fn compare_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use memory_types::{MemoryType, MS_PER_DAY};

    fn memory(id: &str, importance: f64, last_accessed: i64, access_count: i64) -> Memory {
        Memory {
            id: id.to_string(),
            content: "content".to_string(),
            summary: "summary".to_string(),
            memory_type: MemoryType::Fact,
            importance,
            created_at: 0,
            last_accessed,
            access_count,
            expires_at: None,
            metadata: HashMap::new(),
            is_deleted: false,
        }
    }

    fn set(candidates: Vec<Candidate>) -> CandidateSet {
        CandidateSet {
            total_count: candidates.len(),
            candidates,
            terms: vec![],
        }
    }

    fn engine() -> ScoringEngine {
        ScoringEngine::new(ScoringWeights::default(), LifecycleSettings::default())
    }

    #[test]
    fn test_coverage_dominates_at_equal_relevance() {
        let now = 0;
        let ranked = engine().rank(
            set(vec![
                Candidate {
                    memory: memory("mem_partial", 5.0, 0, 0),
                    relevance: 3.0,
                    coverage: 0.25,
                },
                Candidate {
                    memory: memory("mem_full", 5.0, 0, 0),
                    relevance: 3.0,
                    coverage: 1.0,
                },
            ]),
            now,
        );
        assert_eq!(ranked[0].memory.id, "mem_full");
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_relevance_normalized_against_set_maximum() {
        let ranked = engine().rank(
            set(vec![
                Candidate {
                    memory: memory("mem_a", 5.0, 0, 0),
                    relevance: 8.0,
                    coverage: 0.5,
                },
                Candidate {
                    memory: memory("mem_b", 5.0, 0, 0),
                    relevance: 4.0,
                    coverage: 0.5,
                },
            ]),
            0,
        );
        let a = ranked.iter().find(|s| s.memory.id == "mem_a").unwrap();
        let b = ranked.iter().find(|s| s.memory.id == "mem_b").unwrap();
        assert_eq!(a.relevance, 1.0);
        assert_eq!(b.relevance, 0.5);
    }

    #[test]
    fn test_recent_access_outranks_stale() {
        let now = 30 * MS_PER_DAY;
        let ranked = engine().rank(
            set(vec![
                Candidate {
                    memory: memory("mem_stale", 5.0, 0, 1),
                    relevance: 2.0,
                    coverage: 0.5,
                },
                Candidate {
                    memory: memory("mem_fresh", 5.0, now - MS_PER_DAY, 1),
                    relevance: 2.0,
                    coverage: 0.5,
                },
            ]),
            now,
        );
        assert_eq!(ranked[0].memory.id, "mem_fresh");
    }

    #[test]
    fn test_frequency_has_diminishing_returns() {
        let cap = 50;
        let step_low = frequency_signal(2, cap) - frequency_signal(1, cap);
        let step_high = frequency_signal(41, cap) - frequency_signal(40, cap);
        assert!(step_low > step_high);
        assert_eq!(frequency_signal(0, cap), 0.0);
        assert_eq!(frequency_signal(10_000, cap), 1.0);
    }

    #[test]
    fn test_tie_breaks_by_importance_then_recency_then_id() {
        // Zero weights except coverage, and equal coverage: all composite
        // scores tie, forcing the fallback chain.
        let weights = ScoringWeights {
            relevance: 0.0,
            coverage: 1.0,
            importance: 0.0,
            recency: 0.0,
            frequency: 0.0,
        };
        let engine = ScoringEngine::new(weights, LifecycleSettings::default());

        let ranked = engine.rank(
            set(vec![
                Candidate {
                    memory: memory("mem_b", 4.0, 100, 0),
                    relevance: 1.0,
                    coverage: 0.5,
                },
                Candidate {
                    memory: memory("mem_a", 4.0, 100, 0),
                    relevance: 1.0,
                    coverage: 0.5,
                },
                Candidate {
                    memory: memory("mem_c", 4.0, 200, 0),
                    relevance: 1.0,
                    coverage: 0.5,
                },
                Candidate {
                    memory: memory("mem_d", 6.0, 0, 0),
                    relevance: 1.0,
                    coverage: 0.5,
                },
            ]),
            1_000,
        );
        let ids: Vec<_> = ranked.iter().map(|s| s.memory.id.as_str()).collect();
        // importance first (mem_d), then last_accessed (mem_c), then id
        assert_eq!(ids, vec!["mem_d", "mem_c", "mem_a", "mem_b"]);
    }

    #[test]
    fn test_scores_bounded_zero_one() {
        let ranked = engine().rank(
            set(vec![Candidate {
                memory: memory("mem_max", 10.0, 0, 1_000),
                relevance: 100.0,
                coverage: 1.0,
            }]),
            0,
        );
        assert!(ranked[0].score <= 1.0);
        assert!(ranked[0].score >= 0.0);
    }

    #[test]
    fn test_empty_set_ranks_empty() {
        assert!(engine().rank(set(vec![]), 0).is_empty());
    }
}
