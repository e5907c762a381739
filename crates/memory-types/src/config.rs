//! Configuration loading.
//!
//! Layered precedence, later sources override earlier:
//! 1. Built-in defaults
//! 2. Config file (~/.config/memory-store/config.toml)
//! 3. CLI-specified config file (optional)
//! 4. Environment variables (MEMORY_*)
//!
//! CLI flags are applied by the caller after `Settings::load` returns.

use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// Query rewriting and search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Minimum term length kept by the query rewriter. Shorter terms would
    /// produce over-broad prefix wildcards.
    #[serde(default = "default_min_term_length")]
    pub min_term_length: usize,

    /// Terms dropped before prefix-wildcarding.
    #[serde(default = "default_stopwords")]
    pub stopwords: Vec<String>,

    /// Default result limit when the caller does not specify one.
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Hard cap on the result limit.
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// Default token budget for recall details.
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: usize,
}

fn default_min_term_length() -> usize {
    3
}

fn default_stopwords() -> Vec<String> {
    // Small English list; articles, copulas, and high-frequency glue words
    // that only widen OR-expansion without adding signal.
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have",
        "how", "in", "is", "it", "its", "not", "of", "on", "or", "that", "the", "to", "was",
        "were", "what", "when", "where", "which", "who", "will", "with",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_limit() -> usize {
    10
}

fn default_max_limit() -> usize {
    100
}

fn default_max_tokens() -> usize {
    1000
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            min_term_length: default_min_term_length(),
            stopwords: default_stopwords(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            default_max_tokens: default_max_tokens(),
        }
    }
}

impl SearchSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_term_length == 0 {
            return Err("min_term_length must be > 0".to_string());
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(format!(
                "default_limit must be 1..={}, got {}",
                self.max_limit, self.default_limit
            ));
        }
        Ok(())
    }
}

/// Composite-score weights for the scoring engine.
///
/// Weights are free-form positive numbers; the engine sum-normalizes them,
/// so only their ratios matter. Operators retune relevance-vs-importance
/// balance here rather than in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Native full-text relevance (normalized against the candidate set max)
    #[serde(default = "default_w_relevance")]
    pub relevance: f64,

    /// Fraction of query terms literally present in the content
    #[serde(default = "default_w_coverage")]
    pub coverage: f64,

    /// Effective importance / 10
    #[serde(default = "default_w_importance")]
    pub importance: f64,

    /// Decay of elapsed time since last access
    #[serde(default = "default_w_recency")]
    pub recency: f64,

    /// Diminishing-returns growth in access count
    #[serde(default = "default_w_frequency")]
    pub frequency: f64,
}

fn default_w_relevance() -> f64 {
    0.35
}

fn default_w_coverage() -> f64 {
    0.25
}

fn default_w_importance() -> f64 {
    0.15
}

fn default_w_recency() -> f64 {
    0.15
}

fn default_w_frequency() -> f64 {
    0.10
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            relevance: default_w_relevance(),
            coverage: default_w_coverage(),
            importance: default_w_importance(),
            recency: default_w_recency(),
            frequency: default_w_frequency(),
        }
    }
}

impl ScoringWeights {
    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.relevance + self.coverage + self.importance + self.recency + self.frequency
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        let weights = [
            self.relevance,
            self.coverage,
            self.importance,
            self.recency,
            self.frequency,
        ];
        if weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err("scoring weights must be finite and >= 0".to_string());
        }
        if self.total() <= 0.0 {
            return Err("at least one scoring weight must be > 0".to_string());
        }
        Ok(())
    }
}

/// Lifecycle (TTL, refresh, pruning) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleSettings {
    /// Days a soft-deleted memory is retained before prune may purge it.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Half-life in days for the recency decay used at ranking time.
    #[serde(default = "default_recency_half_life_days")]
    pub recency_half_life_days: f64,

    /// Access count at which the frequency signal saturates.
    #[serde(default = "default_frequency_cap")]
    pub frequency_cap: i64,
}

fn default_retention_days() -> u32 {
    30
}

fn default_recency_half_life_days() -> f64 {
    7.0
}

fn default_frequency_cap() -> i64 {
    50
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            recency_half_life_days: default_recency_half_life_days(),
            frequency_cap: default_frequency_cap(),
        }
    }
}

impl LifecycleSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.recency_half_life_days <= 0.0 {
            return Err("recency_half_life_days must be > 0".to_string());
        }
        if self.frequency_cap < 1 {
            return Err("frequency_cap must be >= 1".to_string());
        }
        Ok(())
    }
}

/// Main application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Search and query-rewriting settings
    #[serde(default)]
    pub search: SearchSettings,

    /// Composite scoring weights
    #[serde(default)]
    pub scoring: ScoringWeights,

    /// TTL / refresh / pruning settings
    #[serde(default)]
    pub lifecycle: LifecycleSettings,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "memory-store")
        .map(|p| p.data_local_dir().join("memory.db"))
        .unwrap_or_else(|| PathBuf::from("./memory.db"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            search: SearchSettings::default(),
            scoring: ScoringWeights::default(),
            lifecycle: LifecycleSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence (defaults, default config
    /// file, optional CLI config file, `MEMORY_*` environment variables).
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, MemoryError> {
        let config_dir = ProjectDirs::from("", "", "memory-store")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        let loaded = builder
            .add_source(Environment::with_prefix("MEMORY").separator("__"))
            .build()
            .map_err(|e| MemoryError::Config(e.to_string()))?;

        let settings: Settings = loaded
            .try_deserialize()
            .map_err(|e| MemoryError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate all nested sections.
    pub fn validate(&self) -> Result<(), MemoryError> {
        self.search.validate().map_err(MemoryError::Config)?;
        self.scoring.validate().map_err(MemoryError::Config)?;
        self.lifecycle.validate().map_err(MemoryError::Config)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.search.min_term_length, 3);
        assert_eq!(settings.search.default_max_tokens, 1000);
        assert_eq!(settings.lifecycle.retention_days, 30);
    }

    #[test]
    fn test_weights_sum_to_one_by_default() {
        let weights = ScoringWeights::default();
        assert!((weights.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let weights = ScoringWeights {
            relevance: -0.1,
            ..Default::default()
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_all_zero_weights_rejected() {
        let weights = ScoringWeights {
            relevance: 0.0,
            coverage: 0.0,
            importance: 0.0,
            recency: 0.0,
            frequency: 0.0,
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_default_limit_must_fit_max() {
        let search = SearchSettings {
            default_limit: 500,
            ..Default::default()
        };
        assert!(search.validate().is_err());
    }

    #[test]
    fn test_stopwords_contain_glue_words() {
        let stopwords = default_stopwords();
        assert!(stopwords.contains(&"the".to_string()));
        assert!(stopwords.contains(&"and".to_string()));
    }
}
