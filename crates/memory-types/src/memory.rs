//! Memory and entity records.
//!
//! Timestamps are epoch milliseconds throughout, matching the on-disk
//! schema; `DateTime<Utc>` conversion happens only at display seams.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classification of a stored memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// A plain fact about the world (default)
    #[default]
    Fact,
    /// A memory about a specific named entity
    Entity,
    /// A relationship between entities
    Relationship,
    /// A self-referential memory about the assistant itself
    #[serde(rename = "self")]
    SelfRef,
}

impl MemoryType {
    /// Stable string form used in the database `type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Fact => "fact",
            MemoryType::Entity => "entity",
            MemoryType::Relationship => "relationship",
            MemoryType::SelfRef => "self",
        }
    }

    /// Parse the database string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fact" => Some(MemoryType::Fact),
            "entity" => Some(MemoryType::Entity),
            "relationship" => Some(MemoryType::Relationship),
            "self" => Some(MemoryType::SelfRef),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored memory record.
///
/// Owned by the store; mutated only through the engine's
/// store/update/access/forget operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Opaque stable identifier (`mem_<ulid>`)
    pub id: String,

    /// Full memory text
    pub content: String,

    /// Short derived summary (15-25 words)
    pub summary: String,

    /// Memory classification
    #[serde(rename = "type")]
    pub memory_type: MemoryType,

    /// Importance score, always within [0, 10]
    pub importance: f64,

    /// Creation time (epoch ms)
    pub created_at: i64,

    /// Last access time (epoch ms)
    pub last_accessed: i64,

    /// Number of recall hits; monotonically non-decreasing
    pub access_count: i64,

    /// Expiration time (epoch ms); `None` = permanent.
    /// Once concrete, refresh only ever extends it forward.
    pub expires_at: Option<i64>,

    /// Advisory metadata bag. Core logic reads only a documented subset
    /// of keys (`permanent`, `deprecated`, `project_requirement`, `source`).
    #[serde(default)]
    pub metadata: HashMap<String, Value>,

    /// Soft-delete flag; excluded from default search when set
    #[serde(default)]
    pub is_deleted: bool,
}

impl Memory {
    /// Whether the memory is past its expiration at `now` (epoch ms).
    ///
    /// "Expired" is never persisted; it is computed on demand.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now_ms)
    }

    /// Days elapsed since last access at `now` (epoch ms), never negative.
    pub fn idle_days(&self, now_ms: i64) -> f64 {
        ms_to_days(now_ms.saturating_sub(self.last_accessed))
    }

    /// Days elapsed since creation at `now` (epoch ms), never negative.
    pub fn age_days(&self, now_ms: i64) -> f64 {
        ms_to_days(now_ms.saturating_sub(self.created_at))
    }
}

/// A named entity associated with memories (many-to-many).
///
/// An entity with no remaining memory association is orphaned and removed
/// during pruning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Opaque stable identifier (`ent_<ulid>`)
    pub id: String,

    /// Entity name (unique together with `entity_type`)
    pub name: String,

    /// Entity classification (person, project, tool, ...)
    pub entity_type: String,

    /// Advisory metadata bag
    #[serde(default)]
    pub metadata: HashMap<String, Value>,

    /// Creation time (epoch ms)
    pub created_at: i64,
}

/// Milliseconds in one day.
pub const MS_PER_DAY: i64 = 86_400_000;

/// Convert a millisecond duration to fractional days, clamped at zero.
pub fn ms_to_days(ms: i64) -> f64 {
    (ms.max(0) as f64) / MS_PER_DAY as f64
}

/// Convert fractional days to milliseconds.
pub fn days_to_ms(days: f64) -> i64 {
    (days * MS_PER_DAY as f64) as i64
}

/// Current time as epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Render an epoch-ms timestamp as RFC 3339 for display.
pub fn format_ms(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt: DateTime<Utc>| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_memory() -> Memory {
        Memory {
            id: "mem_01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
            content: "The homelab runs on a refurbished tower".to_string(),
            summary: "Homelab hardware".to_string(),
            memory_type: MemoryType::Fact,
            importance: 5.0,
            created_at: 1_700_000_000_000,
            last_accessed: 1_700_000_000_000,
            access_count: 0,
            expires_at: Some(1_700_000_000_000 + 90 * MS_PER_DAY),
            metadata: HashMap::new(),
            is_deleted: false,
        }
    }

    #[test]
    fn test_memory_type_roundtrip() {
        for t in [
            MemoryType::Fact,
            MemoryType::Entity,
            MemoryType::Relationship,
            MemoryType::SelfRef,
        ] {
            assert_eq!(MemoryType::parse(t.as_str()), Some(t));
        }
        assert_eq!(MemoryType::parse("bogus"), None);
    }

    #[test]
    fn test_self_serializes_as_self() {
        let json = serde_json::to_string(&MemoryType::SelfRef).unwrap();
        assert_eq!(json, "\"self\"");
        let decoded: MemoryType = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, MemoryType::SelfRef);
    }

    #[test]
    fn test_expiry_is_computed_not_stored() {
        let mem = sample_memory();
        let at = mem.expires_at.unwrap();
        assert!(!mem.is_expired(at - 1));
        assert!(mem.is_expired(at));
        assert!(mem.is_expired(at + 1));

        let permanent = Memory {
            expires_at: None,
            ..mem
        };
        assert!(!permanent.is_expired(i64::MAX));
    }

    #[test]
    fn test_idle_days_never_negative() {
        let mem = sample_memory();
        // Clock skew: now before last_accessed
        assert_eq!(mem.idle_days(mem.last_accessed - MS_PER_DAY), 0.0);
        assert!((mem.idle_days(mem.last_accessed + MS_PER_DAY) - 1.0).abs() < 1e-9);
    }
}
