//! Typed SQL surface over the driver.
//!
//! `MemoryStore` owns the driver handle and does all row mapping. The
//! core components above it never see SQL; they see memories, entities,
//! provenance records, and search hits.

use std::collections::HashMap;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use memory_types::{Entity, Memory, MemoryError, MemoryType, Operation, Provenance, Result};

use crate::driver::{open_driver, Driver, DriverConfig, Row, Value};
use crate::schema;

/// Structural filters applied as SQL predicates, never as part of the
/// full-text match expression.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Restrict to one memory type
    pub memory_type: Option<MemoryType>,
    /// Restrict to memories linked to any of these entity names
    pub entities: Vec<String>,
    /// Minimum stored importance
    pub min_importance: Option<f64>,
    /// Lift the soft-delete and expiry predicates (internal tooling only)
    pub include_expired: bool,
}

/// One full-text match with the engine's native relevance.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub memory: Memory,
    /// Negated bm25 value: higher is more relevant
    pub relevance: f64,
}

/// Aggregate counts for the stats surface.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub active: i64,
    pub deleted: i64,
    pub by_type: Vec<(String, i64)>,
    /// Database size in bytes (page_count * page_size)
    pub db_bytes: i64,
}

const MEMORY_COLUMNS: &str = "m.id, m.content, m.summary, m.type, m.importance, m.created_at, \
     m.last_accessed, m.access_count, m.expires_at, m.metadata, m.is_deleted";

/// Storage collaborator consumed by the core engine.
pub struct MemoryStore {
    driver: Box<dyn Driver>,
}

impl MemoryStore {
    /// Wrap an already-open driver. The schema must exist.
    pub fn new(driver: Box<dyn Driver>) -> Self {
        Self { driver }
    }

    /// Open the configured driver and bootstrap the schema if missing.
    pub fn open(config: &DriverConfig) -> Result<Self> {
        let driver = open_driver(config)?;
        if !schema::is_initialized(driver.as_ref())? {
            schema::initialize_schema(driver.as_ref())?;
        }
        Ok(Self { driver })
    }

    /// Direct driver access for maintenance paths (FTS rebuild, stats).
    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    /// Close the underlying connection.
    pub fn close(self) -> Result<()> {
        self.driver.close()
    }

    /// Run `f` inside one immediate transaction: fully committed or fully
    /// rolled back, never partially applied.
    pub fn in_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        self.driver.begin()?;
        match f(self) {
            Ok(value) => {
                self.driver.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rb) = self.driver.rollback() {
                    warn!(error = %rb, "Rollback failed after operation error");
                }
                Err(err)
            }
        }
    }

    // ==================== Memories ====================

    /// Insert a new memory row.
    pub fn insert_memory(&self, memory: &Memory) -> Result<()> {
        self.driver.execute(
            "INSERT INTO memories (id, content, summary, type, importance, created_at, \
             last_accessed, access_count, expires_at, metadata, is_deleted) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            &[
                Value::from(memory.id.as_str()),
                Value::from(memory.content.as_str()),
                Value::from(memory.summary.as_str()),
                Value::from(memory.memory_type.as_str()),
                Value::from(memory.importance),
                Value::from(memory.created_at),
                Value::from(memory.last_accessed),
                Value::from(memory.access_count),
                Value::from(memory.expires_at),
                Value::from(serialize_metadata(&memory.metadata)?),
                Value::from(memory.is_deleted),
            ],
        )?;
        Ok(())
    }

    /// Fetch a memory by exact id, regardless of lifecycle state.
    pub fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        let row = self.driver.fetch_one(
            &format!("SELECT {MEMORY_COLUMNS} FROM memories m WHERE m.id = ?1"),
            &[Value::from(id)],
        )?;
        row.map(|r| row_to_memory(&r)).transpose()
    }

    /// Resolve a (possibly truncated) id against active memories.
    ///
    /// Returns an error when the prefix is ambiguous.
    pub fn resolve_id(&self, prefix: &str) -> Result<Option<String>> {
        // `%` and `_` in the prefix must match literally, not as LIKE
        // wildcards (ids themselves contain `_`).
        let escaped = prefix
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let rows = self.driver.fetch_all(
            "SELECT id FROM memories \
             WHERE id LIKE ?1 || '%' ESCAPE '\\' AND is_deleted = 0 LIMIT 2",
            &[Value::from(escaped.as_str())],
        )?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(Some(rows[0].text("id")?)),
            _ => Err(MemoryError::Validation(format!(
                "id prefix '{prefix}' is ambiguous"
            ))),
        }
    }

    /// Persist all mutable columns of a memory.
    pub fn update_memory(&self, memory: &Memory) -> Result<()> {
        let changed = self.driver.execute(
            "UPDATE memories SET content = ?2, summary = ?3, type = ?4, importance = ?5, \
             last_accessed = ?6, access_count = ?7, expires_at = ?8, metadata = ?9, \
             is_deleted = ?10 WHERE id = ?1",
            &[
                Value::from(memory.id.as_str()),
                Value::from(memory.content.as_str()),
                Value::from(memory.summary.as_str()),
                Value::from(memory.memory_type.as_str()),
                Value::from(memory.importance),
                Value::from(memory.last_accessed),
                Value::from(memory.access_count),
                Value::from(memory.expires_at),
                Value::from(serialize_metadata(&memory.metadata)?),
                Value::from(memory.is_deleted),
            ],
        )?;
        if changed == 0 {
            return Err(MemoryError::NotFound(memory.id.clone()));
        }
        Ok(())
    }

    /// List active memories, most recent first.
    pub fn list_active(&self, limit: usize) -> Result<Vec<Memory>> {
        let rows = self.driver.fetch_all(
            &format!(
                "SELECT {MEMORY_COLUMNS} FROM memories m \
                 WHERE m.is_deleted = 0 ORDER BY m.created_at DESC LIMIT ?1"
            ),
            &[Value::from(limit as i64)],
        )?;
        rows.iter().map(row_to_memory).collect()
    }

    /// Whether any active memory carries this `metadata.source` value.
    /// Used by the import path to deduplicate re-imported files.
    pub fn source_exists(&self, source: &str) -> Result<bool> {
        let found = self.driver.fetch_scalar(
            "SELECT 1 FROM memories \
             WHERE is_deleted = 0 AND json_extract(metadata, '$.source') = ?1 LIMIT 1",
            &[Value::from(source)],
        )?;
        Ok(found.is_some())
    }

    // ==================== Full-text search ====================

    /// Run a match expression against the FTS index with structural
    /// filters as SQL predicates. Results are ordered by native relevance
    /// (descending) with id as a stable fallback.
    pub fn search_fts(
        &self,
        match_expr: &str,
        filters: &SearchFilters,
        now_ms: i64,
    ) -> Result<Vec<SearchHit>> {
        let mut sql = format!(
            "SELECT {MEMORY_COLUMNS}, -bm25(memories_fts) AS relevance \
             FROM memories_fts \
             JOIN memories m ON m.rowid = memories_fts.rowid \
             WHERE memories_fts MATCH ?"
        );
        let mut params: Vec<Value> = vec![Value::from(match_expr)];

        if !filters.include_expired {
            sql.push_str(" AND m.is_deleted = 0 AND (m.expires_at IS NULL OR m.expires_at > ?)");
            params.push(Value::from(now_ms));
        }
        if let Some(memory_type) = filters.memory_type {
            sql.push_str(" AND m.type = ?");
            params.push(Value::from(memory_type.as_str()));
        }
        if let Some(min) = filters.min_importance {
            sql.push_str(" AND m.importance >= ?");
            params.push(Value::from(min));
        }
        if !filters.entities.is_empty() {
            let placeholders = vec!["?"; filters.entities.len()].join(", ");
            sql.push_str(&format!(
                " AND m.id IN (SELECT me.memory_id FROM memory_entities me \
                 JOIN entities e ON e.id = me.entity_id WHERE e.name IN ({placeholders}))"
            ));
            for name in &filters.entities {
                params.push(Value::from(name.as_str()));
            }
        }
        sql.push_str(" ORDER BY relevance DESC, m.id ASC");

        let rows = self.driver.fetch_all(&sql, &params)?;
        debug!(matches = rows.len(), "FTS query returned");
        rows.iter()
            .map(|row| {
                Ok(SearchHit {
                    memory: row_to_memory(row)?,
                    relevance: row.real("relevance")?,
                })
            })
            .collect()
    }

    // ==================== Entities ====================

    /// Find or create an entity by (name, type); returns its id.
    pub fn upsert_entity(&self, id: &str, name: &str, entity_type: &str, now_ms: i64) -> Result<String> {
        if let Some(row) = self.driver.fetch_one(
            "SELECT id FROM entities WHERE name = ?1 AND type = ?2",
            &[Value::from(name), Value::from(entity_type)],
        )? {
            return row.text("id");
        }
        self.driver.execute(
            "INSERT INTO entities (id, name, type, metadata, created_at) \
             VALUES (?1, ?2, ?3, NULL, ?4)",
            &[
                Value::from(id),
                Value::from(name),
                Value::from(entity_type),
                Value::from(now_ms),
            ],
        )?;
        Ok(id.to_string())
    }

    /// Associate a memory with an entity (idempotent).
    pub fn link_entity(&self, memory_id: &str, entity_id: &str) -> Result<()> {
        self.driver.execute(
            "INSERT OR IGNORE INTO memory_entities (memory_id, entity_id) VALUES (?1, ?2)",
            &[Value::from(memory_id), Value::from(entity_id)],
        )?;
        Ok(())
    }

    /// Entities associated with a memory.
    pub fn entities_for_memory(&self, memory_id: &str) -> Result<Vec<Entity>> {
        let rows = self.driver.fetch_all(
            "SELECT e.id, e.name, e.type, e.metadata, e.created_at \
             FROM entities e JOIN memory_entities me ON me.entity_id = e.id \
             WHERE me.memory_id = ?1 ORDER BY e.name",
            &[Value::from(memory_id)],
        )?;
        rows.iter()
            .map(|row| {
                Ok(Entity {
                    id: row.text("id")?,
                    name: row.text("name")?,
                    entity_type: row.text("type")?,
                    metadata: parse_metadata(row.opt_text("metadata").as_deref(), "entity"),
                    created_at: row.integer("created_at")?,
                })
            })
            .collect()
    }

    /// Entities with no remaining memory association.
    pub fn count_orphan_entities(&self) -> Result<i64> {
        let count = self.driver.fetch_scalar(
            "SELECT COUNT(*) FROM entities \
             WHERE id NOT IN (SELECT entity_id FROM memory_entities)",
            &[],
        )?;
        Ok(count.and_then(|v| v.as_integer()).unwrap_or(0))
    }

    /// Delete orphaned entities, returning how many were removed.
    pub fn delete_orphan_entities(&self) -> Result<usize> {
        self.driver.execute(
            "DELETE FROM entities WHERE id NOT IN (SELECT entity_id FROM memory_entities)",
            &[],
        )
    }

    // ==================== Provenance ====================

    /// Append one provenance record. Records are never mutated.
    pub fn insert_provenance(&self, record: &Provenance) -> Result<()> {
        let changes = record
            .changes
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.driver.execute(
            "INSERT INTO provenance (memory_id, operation, timestamp, source, context, user_id, changes) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            &[
                Value::from(record.memory_id.as_str()),
                Value::from(record.operation.as_str()),
                Value::from(record.timestamp),
                Value::from(record.source.as_deref()),
                Value::from(record.context.as_deref()),
                Value::from(record.user_id.as_deref()),
                Value::from(changes),
            ],
        )?;
        Ok(())
    }

    /// The most recent provenance record for a memory, if any.
    pub fn latest_provenance(&self, memory_id: &str) -> Result<Option<Provenance>> {
        let row = self.driver.fetch_one(
            "SELECT memory_id, operation, timestamp, source, context, user_id, changes \
             FROM provenance WHERE memory_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT 1",
            &[Value::from(memory_id)],
        )?;
        row.map(|r| {
            let operation_str = r.text("operation")?;
            let operation = Operation::parse(&operation_str).ok_or_else(|| {
                MemoryError::storage("provenance", format!("unknown operation {operation_str}"))
            })?;
            let changes = r
                .opt_text("changes")
                .map(|s| serde_json::from_str::<JsonValue>(&s))
                .transpose()?;
            Ok(Provenance {
                memory_id: r.text("memory_id")?,
                operation,
                timestamp: r.integer("timestamp")?,
                source: r.opt_text("source"),
                context: r.opt_text("context"),
                user_id: r.opt_text("user_id"),
                changes,
            })
        })
        .transpose()
    }

    // ==================== Pruning ====================

    /// Active, non-permanent memories past their expiration.
    pub fn count_expired(&self, now_ms: i64) -> Result<i64> {
        let count = self.driver.fetch_scalar(
            "SELECT COUNT(*) FROM memories \
             WHERE is_deleted = 0 AND expires_at IS NOT NULL AND expires_at <= ?1",
            &[Value::from(now_ms)],
        )?;
        Ok(count.and_then(|v| v.as_integer()).unwrap_or(0))
    }

    /// Soft-deleted memories created at or before the retention cutoff.
    pub fn count_deleted_before(&self, cutoff_ms: i64) -> Result<i64> {
        let count = self.driver.fetch_scalar(
            "SELECT COUNT(*) FROM memories WHERE is_deleted = 1 AND created_at <= ?1",
            &[Value::from(cutoff_ms)],
        )?;
        Ok(count.and_then(|v| v.as_integer()).unwrap_or(0))
    }

    /// Entities a prune pass at these cutoffs would leave with no
    /// surviving memory association. Entities already orphaned count
    /// too, matching what the delete pass removes.
    pub fn count_entities_orphaned_by(&self, now_ms: i64, cutoff_ms: i64) -> Result<i64> {
        let count = self.driver.fetch_scalar(
            "SELECT COUNT(*) FROM entities e \
             WHERE NOT EXISTS ( \
                 SELECT 1 FROM memory_entities me \
                 JOIN memories m ON m.id = me.memory_id \
                 WHERE me.entity_id = e.id \
                   AND NOT (m.is_deleted = 0 AND m.expires_at IS NOT NULL AND m.expires_at <= ?1) \
                   AND NOT (m.is_deleted = 1 AND m.created_at <= ?2))",
            &[Value::from(now_ms), Value::from(cutoff_ms)],
        )?;
        Ok(count.and_then(|v| v.as_integer()).unwrap_or(0))
    }

    /// Permanently remove expired memories. Join rows cascade; the FTS
    /// mirror follows via trigger.
    pub fn delete_expired(&self, now_ms: i64) -> Result<usize> {
        self.driver.execute(
            "DELETE FROM memories \
             WHERE is_deleted = 0 AND expires_at IS NOT NULL AND expires_at <= ?1",
            &[Value::from(now_ms)],
        )
    }

    /// Permanently remove soft-deleted memories past retention.
    pub fn delete_soft_deleted_before(&self, cutoff_ms: i64) -> Result<usize> {
        self.driver.execute(
            "DELETE FROM memories WHERE is_deleted = 1 AND created_at <= ?1",
            &[Value::from(cutoff_ms)],
        )
    }

    // ==================== Stats ====================

    /// Aggregate counts for the CLI stats surface.
    pub fn stats(&self) -> Result<StoreStats> {
        let active = self
            .driver
            .fetch_scalar("SELECT COUNT(*) FROM memories WHERE is_deleted = 0", &[])?
            .and_then(|v| v.as_integer())
            .unwrap_or(0);
        let deleted = self
            .driver
            .fetch_scalar("SELECT COUNT(*) FROM memories WHERE is_deleted = 1", &[])?
            .and_then(|v| v.as_integer())
            .unwrap_or(0);
        let rows = self.driver.fetch_all(
            "SELECT type, COUNT(*) AS c FROM memories WHERE is_deleted = 0 \
             GROUP BY type ORDER BY type",
            &[],
        )?;
        let by_type = rows
            .iter()
            .map(|r| Ok((r.text("type")?, r.integer("c")?)))
            .collect::<Result<Vec<_>>>()?;
        let page_count = self
            .driver
            .fetch_scalar("PRAGMA page_count", &[])?
            .and_then(|v| v.as_integer())
            .unwrap_or(0);
        let page_size = self
            .driver
            .fetch_scalar("PRAGMA page_size", &[])?
            .and_then(|v| v.as_integer())
            .unwrap_or(0);
        Ok(StoreStats {
            active,
            deleted,
            by_type,
            db_bytes: page_count * page_size,
        })
    }
}

fn serialize_metadata(metadata: &HashMap<String, JsonValue>) -> Result<Option<String>> {
    if metadata.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(metadata)?))
}

/// Metadata is advisory: a malformed bag falls back to an empty map
/// instead of failing the whole read.
fn parse_metadata(raw: Option<&str>, id: &str) -> HashMap<String, JsonValue> {
    match raw {
        None => HashMap::new(),
        Some(s) => match serde_json::from_str(s) {
            Ok(map) => map,
            Err(e) => {
                warn!(id = %id, error = %e, "Malformed metadata, treating as empty");
                HashMap::new()
            }
        },
    }
}

fn row_to_memory(row: &Row) -> Result<Memory> {
    let id = row.text("id")?;
    let type_str = row.text("type")?;
    let memory_type = MemoryType::parse(&type_str).unwrap_or_else(|| {
        warn!(id = %id, memory_type = %type_str, "Unknown memory type, treating as fact");
        MemoryType::Fact
    });
    Ok(Memory {
        content: row.text("content")?,
        summary: row.text("summary")?,
        memory_type,
        importance: row.real("importance")?,
        created_at: row.integer("created_at")?,
        last_accessed: row.integer("last_accessed")?,
        access_count: row.integer("access_count")?,
        expires_at: row.opt_integer("expires_at"),
        metadata: parse_metadata(row.opt_text("metadata").as_deref(), &id),
        is_deleted: row.integer("is_deleted")? != 0,
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverConfig;
    use memory_types::MS_PER_DAY;

    fn open_store() -> MemoryStore {
        MemoryStore::open(&DriverConfig::Ephemeral).unwrap()
    }

    fn sample(id: &str, content: &str) -> Memory {
        Memory {
            id: id.to_string(),
            content: content.to_string(),
            summary: content.chars().take(30).collect(),
            memory_type: MemoryType::Fact,
            importance: 5.0,
            created_at: 1_000,
            last_accessed: 1_000,
            access_count: 0,
            expires_at: None,
            metadata: HashMap::new(),
            is_deleted: false,
        }
    }

    #[test]
    fn test_insert_and_get_roundtrip() {
        let store = open_store();
        let mut mem = sample("mem_a", "UMass Global bonsai tree plant care tips");
        mem.metadata
            .insert("source".to_string(), JsonValue::from("test.md"));
        store.insert_memory(&mem).unwrap();

        let loaded = store.get_memory("mem_a").unwrap().unwrap();
        assert_eq!(loaded.content, mem.content);
        assert_eq!(loaded.metadata["source"], JsonValue::from("test.md"));
        assert!(!loaded.is_deleted);
    }

    #[test]
    fn test_malformed_metadata_falls_back_to_empty() {
        let store = open_store();
        store.insert_memory(&sample("mem_a", "text")).unwrap();
        store
            .driver()
            .execute(
                "UPDATE memories SET metadata = '{not json' WHERE id = 'mem_a'",
                &[],
            )
            .unwrap();
        let loaded = store.get_memory("mem_a").unwrap().unwrap();
        assert!(loaded.metadata.is_empty());
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let store = open_store();
        let err = store.update_memory(&sample("mem_missing", "x")).unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }

    #[test]
    fn test_search_excludes_deleted_and_expired_by_default() {
        let store = open_store();
        let now = 100 * MS_PER_DAY;

        store.insert_memory(&sample("mem_live", "homelab wiring notes")).unwrap();
        let mut gone = sample("mem_gone", "homelab decommissioned rack");
        gone.is_deleted = true;
        store.insert_memory(&gone).unwrap();
        let mut stale = sample("mem_stale", "homelab past plans");
        stale.expires_at = Some(now - 1);
        store.insert_memory(&stale).unwrap();

        let hits = store
            .search_fts("homelab*", &SearchFilters::default(), now)
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.memory.id.as_str()).collect();
        assert_eq!(ids, vec!["mem_live"]);

        let all = store
            .search_fts(
                "homelab*",
                &SearchFilters {
                    include_expired: true,
                    ..Default::default()
                },
                now,
            )
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_entity_filter_and_orphans() {
        let store = open_store();
        store.insert_memory(&sample("mem_a", "kubo the bonsai")).unwrap();
        store.insert_memory(&sample("mem_b", "unrelated bonsai note")).unwrap();

        let ent = store.upsert_entity("ent_1", "Kubo", "plant", 0).unwrap();
        store.link_entity("mem_a", &ent).unwrap();
        // Second upsert with same name/type returns the same id
        assert_eq!(
            store.upsert_entity("ent_other", "Kubo", "plant", 0).unwrap(),
            ent
        );

        let hits = store
            .search_fts(
                "bonsai*",
                &SearchFilters {
                    entities: vec!["Kubo".to_string()],
                    ..Default::default()
                },
                0,
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory.id, "mem_a");

        // Deleting the memory cascades the join row, orphaning the entity
        store
            .driver()
            .execute("DELETE FROM memories WHERE id = 'mem_a'", &[])
            .unwrap();
        assert_eq!(store.count_orphan_entities().unwrap(), 1);
        assert_eq!(store.delete_orphan_entities().unwrap(), 1);
        assert_eq!(store.count_orphan_entities().unwrap(), 0);
    }

    #[test]
    fn test_orphan_prediction_matches_delete_pass() {
        let store = open_store();
        let mut expired = sample("mem_a", "expired bonsai note");
        expired.expires_at = Some(500);
        store.insert_memory(&expired).unwrap();
        let mut trashed = sample("mem_b", "soft-deleted bonsai note");
        trashed.is_deleted = true;
        store.insert_memory(&trashed).unwrap();
        store.insert_memory(&sample("mem_c", "surviving bonsai note")).unwrap();

        let doomed = store.upsert_entity("ent_1", "Kubo", "plant", 0).unwrap();
        store.link_entity("mem_a", &doomed).unwrap();
        store.link_entity("mem_b", &doomed).unwrap();
        let shared = store.upsert_entity("ent_2", "office", "place", 0).unwrap();
        store.link_entity("mem_b", &shared).unwrap();
        store.link_entity("mem_c", &shared).unwrap();

        // All of Kubo's memories fall to the pass; office keeps mem_c
        let predicted = store.count_entities_orphaned_by(1_000, 2_000).unwrap();
        assert_eq!(predicted, 1);

        store.delete_expired(1_000).unwrap();
        store.delete_soft_deleted_before(2_000).unwrap();
        assert_eq!(store.delete_orphan_entities().unwrap(), predicted as usize);
    }

    #[test]
    fn test_latest_provenance_wins() {
        let store = open_store();
        for (ts, op) in [(10, Operation::Create), (20, Operation::Access)] {
            store
                .insert_provenance(&Provenance {
                    memory_id: "mem_a".to_string(),
                    operation: op,
                    timestamp: ts,
                    source: None,
                    context: None,
                    user_id: None,
                    changes: None,
                })
                .unwrap();
        }
        let latest = store.latest_provenance("mem_a").unwrap().unwrap();
        assert_eq!(latest.operation, Operation::Access);
        assert_eq!(latest.timestamp, 20);
    }

    #[test]
    fn test_prune_counters_match_deletes() {
        let store = open_store();
        let now = 50 * MS_PER_DAY;

        let mut expired = sample("mem_expired", "old fact");
        expired.expires_at = Some(now - 1);
        store.insert_memory(&expired).unwrap();

        let mut deleted = sample("mem_deleted", "forgotten fact");
        deleted.is_deleted = true;
        store.insert_memory(&deleted).unwrap();

        store.insert_memory(&sample("mem_keep", "current fact")).unwrap();

        assert_eq!(store.count_expired(now).unwrap(), 1);
        assert_eq!(store.count_deleted_before(now).unwrap(), 1);
        assert_eq!(store.delete_expired(now).unwrap(), 1);
        assert_eq!(store.delete_soft_deleted_before(now).unwrap(), 1);
        assert!(store.get_memory("mem_keep").unwrap().is_some());
        assert!(store.get_memory("mem_expired").unwrap().is_none());
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = open_store();
        let result: Result<()> = store.in_transaction(|s| {
            s.insert_memory(&sample("mem_tx", "transient"))?;
            Err(MemoryError::Validation("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(store.get_memory("mem_tx").unwrap().is_none());
    }

    #[test]
    fn test_resolve_id_prefix() {
        let store = open_store();
        store.insert_memory(&sample("mem_abc123", "one")).unwrap();
        store.insert_memory(&sample("mem_abd456", "two")).unwrap();

        assert_eq!(
            store.resolve_id("mem_abc").unwrap(),
            Some("mem_abc123".to_string())
        );
        assert!(store.resolve_id("mem_zzz").unwrap().is_none());
        assert!(store.resolve_id("mem_ab").is_err());

        // LIKE metacharacters in a prefix match literally
        assert!(store.resolve_id("%").unwrap().is_none());
        assert!(store.resolve_id("mem_a%3").unwrap().is_none());
        assert!(store.resolve_id("mem\\abc").unwrap().is_none());
    }

    #[test]
    fn test_stats_counts_by_type() {
        let store = open_store();
        store.insert_memory(&sample("mem_1", "a fact")).unwrap();
        let mut selfref = sample("mem_2", "about me");
        selfref.memory_type = MemoryType::SelfRef;
        store.insert_memory(&selfref).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.active, 2);
        assert_eq!(stats.deleted, 0);
        assert!(stats.by_type.contains(&("fact".to_string(), 1)));
        assert!(stats.by_type.contains(&("self".to_string(), 1)));
        assert!(stats.db_bytes > 0);
    }
}
