//! Recall output shaping: detail tiers, view variants, and token counting.

use serde::{Deserialize, Serialize};
use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::warn;

use memory_types::{format_ms, Memory};

/// How much of each recalled memory to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    /// Index line only: id, type, summary.
    Minimal,
    /// Summary plus importance and timestamps.
    Standard,
    /// Full content, metadata, and linked entities.
    Full,
}

impl Default for DetailLevel {
    fn default() -> Self {
        DetailLevel::Standard
    }
}

/// One compact index line, always emitted for every hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub memory_type: String,
    pub summary: String,
    pub score: f64,
}

/// A rendered memory at a specific detail tier.
///
/// The tier is part of the wire shape, so consumers can match on the
/// `detail` tag instead of probing optional fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "detail", rename_all = "lowercase")]
pub enum MemoryView {
    Minimal {
        id: String,
        memory_type: String,
        summary: String,
    },
    Standard {
        id: String,
        memory_type: String,
        summary: String,
        importance: f64,
        created_at: String,
        last_accessed: String,
        score: f64,
    },
    Full {
        id: String,
        memory_type: String,
        summary: String,
        content: String,
        importance: f64,
        created_at: String,
        last_accessed: String,
        access_count: i64,
        expires_at: Option<String>,
        metadata: serde_json::Value,
        entities: Vec<String>,
        score: f64,
    },
}

impl MemoryView {
    /// Render a memory at the requested tier.
    pub fn render(
        memory: &Memory,
        level: DetailLevel,
        score: f64,
        entities: &[String],
    ) -> MemoryView {
        match level {
            DetailLevel::Minimal => MemoryView::Minimal {
                id: memory.id.clone(),
                memory_type: memory.memory_type.as_str().to_string(),
                summary: memory.summary.clone(),
            },
            DetailLevel::Standard => MemoryView::Standard {
                id: memory.id.clone(),
                memory_type: memory.memory_type.as_str().to_string(),
                summary: memory.summary.clone(),
                importance: memory.importance,
                created_at: format_ms(memory.created_at),
                last_accessed: format_ms(memory.last_accessed),
                score,
            },
            DetailLevel::Full => MemoryView::Full {
                id: memory.id.clone(),
                memory_type: memory.memory_type.as_str().to_string(),
                summary: memory.summary.clone(),
                content: memory.content.clone(),
                importance: memory.importance,
                created_at: format_ms(memory.created_at),
                last_accessed: format_ms(memory.last_accessed),
                access_count: memory.access_count,
                expires_at: memory.expires_at.map(format_ms),
                metadata: serde_json::Value::Object(
                    memory
                        .metadata
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                ),
                entities: entities.to_vec(),
                score,
            },
        }
    }

    pub fn id(&self) -> &str {
        match self {
            MemoryView::Minimal { id, .. }
            | MemoryView::Standard { id, .. }
            | MemoryView::Full { id, .. } => id,
        }
    }
}

/// Token counter used to budget recall detail payloads.
///
/// Uses the cl100k_base tokenizer when it loads; falls back to a
/// four-characters-per-token estimate otherwise.
pub struct TokenCounter {
    bpe: Option<CoreBPE>,
}

impl TokenCounter {
    pub fn new() -> Self {
        let bpe = match cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                warn!(error = %e, "tokenizer unavailable, using character estimate");
                None
            }
        };
        TokenCounter { bpe }
    }

    pub fn count(&self, text: &str) -> usize {
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => text.chars().count().div_ceil(4),
        }
    }

    /// Token cost of a rendered view, measured on its JSON encoding.
    pub fn count_view(&self, view: &MemoryView) -> usize {
        match serde_json::to_string(view) {
            Ok(json) => self.count(&json),
            Err(_) => 0,
        }
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_types::MemoryType;

    fn sample_memory() -> Memory {
        Memory {
            id: "mem_01J0000000000000000000TEST".to_string(),
            content: "Bonsai trees need weekly watering and bright light.".to_string(),
            summary: "Bonsai trees need weekly watering.".to_string(),
            memory_type: MemoryType::Fact,
            importance: 6.5,
            created_at: 1_700_000_000_000,
            last_accessed: 1_700_000_000_000,
            access_count: 0,
            expires_at: None,
            metadata: std::collections::HashMap::new(),
            is_deleted: false,
        }
    }

    #[test]
    fn test_minimal_view_omits_content() {
        let view = MemoryView::render(&sample_memory(), DetailLevel::Minimal, 0.9, &[]);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["detail"], "minimal");
        assert!(json.get("content").is_none());
        assert!(json.get("importance").is_none());
    }

    #[test]
    fn test_standard_view_carries_importance_and_timestamps() {
        let view = MemoryView::render(&sample_memory(), DetailLevel::Standard, 0.9, &[]);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["detail"], "standard");
        assert_eq!(json["importance"], 6.5);
        assert!(json["created_at"].is_string());
        assert!(json.get("content").is_none());
    }

    #[test]
    fn test_full_view_includes_content_and_entities() {
        let entities = vec!["bonsai".to_string()];
        let view = MemoryView::render(&sample_memory(), DetailLevel::Full, 0.9, &entities);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["detail"], "full");
        assert!(json["content"].as_str().unwrap().contains("weekly watering"));
        assert_eq!(json["entities"][0], "bonsai");
    }

    #[test]
    fn test_counter_scales_with_text_length() {
        let counter = TokenCounter::new();
        let short = counter.count("bonsai");
        let long = counter.count("bonsai tree plant care requires patience and daily attention");
        assert!(long > short);
        assert!(short >= 1);
    }

    #[test]
    fn test_full_view_costs_more_tokens_than_minimal() {
        let counter = TokenCounter::new();
        let memory = sample_memory();
        let minimal = MemoryView::render(&memory, DetailLevel::Minimal, 0.9, &[]);
        let full = MemoryView::render(&memory, DetailLevel::Full, 0.9, &[]);
        assert!(counter.count_view(&full) > counter.count_view(&minimal));
    }
}
