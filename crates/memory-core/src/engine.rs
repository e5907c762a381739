//! The engine: store / recall / update / forget / prune.
//!
//! Each operation runs inside one immediate transaction on the storage
//! collaborator, so concurrent writers from other processes see either
//! the whole operation or none of it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use ulid::Ulid;

use memory_store::{DriverConfig, MemoryStore};
use memory_types::{
    now_ms, Memory, MemoryError, MemoryType, Operation, Provenance, Result, Settings,
};

use crate::executor::{SearchExecutor, SearchOptions};
use crate::format::{DetailLevel, IndexEntry, MemoryView, TokenCounter};
use crate::lifecycle;
use crate::rewrite::QueryRewriter;
use crate::scoring::{ScoredMemory, ScoringEngine};
use crate::summary::{generate_summary, scrub_sensitive};

/// An entity to associate with a memory at store time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRef {
    pub name: String,
    #[serde(default = "default_entity_type")]
    pub entity_type: String,
}

fn default_entity_type() -> String {
    "other".to_string()
}

/// Input to the store operation.
#[derive(Debug, Clone, Default)]
pub struct StoreInput {
    /// Full memory text
    pub content: String,
    /// Classification; defaults to `fact`
    pub memory_type: MemoryType,
    /// Explicit base importance; computed from content when absent
    pub importance: Option<f64>,
    /// Entities to link
    pub entities: Vec<EntityRef>,
    /// Advisory metadata
    pub metadata: HashMap<String, Value>,
    /// Origin of the store request (cli, import, ...)
    pub source: Option<String>,
    /// Explicit summary; derived from content when absent
    pub summary: Option<String>,
}

/// Options for the recall operation.
#[derive(Debug, Clone)]
pub struct RecallOptions {
    /// Raw natural-language query
    pub query: String,
    /// Detail window size; defaults to the configured limit
    pub limit: Option<usize>,
    /// Restrict to one memory type
    pub memory_type: Option<MemoryType>,
    /// Restrict to memories linked to any of these entity names
    pub entities: Vec<String>,
    /// Detail tier for the detail window
    pub detail: DetailLevel,
    /// Token budget for the detail payload; defaults to the configured budget
    pub max_tokens: Option<usize>,
}

impl RecallOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: None,
            memory_type: None,
            entities: Vec::new(),
            detail: DetailLevel::default(),
            max_tokens: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    pub fn with_entities(mut self, entities: Vec<String>) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_detail(mut self, detail: DetailLevel) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Recall result: a compact index over every ranked hit plus a
/// token-budgeted detail window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallResponse {
    /// The match expression actually executed
    pub query: String,
    /// One line per ranked hit, cheapest possible rendering
    pub index: Vec<IndexEntry>,
    /// Rendered views for the detail window, budget permitting
    pub details: Vec<MemoryView>,
    /// Total ranked hits before windowing
    pub total_count: usize,
    /// Whether ranked hits remain past the detail window
    pub has_more: bool,
    /// Tokens consumed by the detail payload
    pub tokens_used: usize,
}

/// Field updates for the update operation. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct UpdateFields {
    pub content: Option<String>,
    pub summary: Option<String>,
    pub importance: Option<f64>,
    pub memory_type: Option<MemoryType>,
    /// Merged key-by-key into the existing metadata
    pub metadata: Option<HashMap<String, Value>>,
    /// Free-form reason recorded in provenance
    pub reason: Option<String>,
}

/// Outcome of the forget operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgetResponse {
    pub id: String,
    pub summary: String,
}

/// Outcome of the prune operation. With `dry_run` the counts describe what
/// would be removed; nothing is touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneReport {
    pub dry_run: bool,
    /// Hard-deleted memories in total (expired + past retention)
    pub pruned_count: usize,
    /// Hard-deleted expired memories
    pub expired_count: usize,
    /// Hard-deleted soft-deleted memories past retention
    pub deleted_count: usize,
    /// Entities left with no memory association
    pub orphaned_entities: usize,
}

/// The memory engine. Owns the store and every policy component.
pub struct MemoryEngine {
    store: MemoryStore,
    settings: Settings,
    rewriter: QueryRewriter,
    scorer: ScoringEngine,
    counter: TokenCounter,
}

impl MemoryEngine {
    /// Open the configured driver and bootstrap the schema if needed.
    pub fn open(settings: Settings) -> Result<Self> {
        let config = if settings.db_path == ":memory:" {
            DriverConfig::Ephemeral
        } else {
            DriverConfig::File(settings.db_path.clone().into())
        };
        let store = MemoryStore::open(&config)?;
        Ok(Self::with_store(store, settings))
    }

    /// Wrap an already-open store.
    pub fn with_store(store: MemoryStore, settings: Settings) -> Self {
        let rewriter = QueryRewriter::new(&settings.search);
        let scorer = ScoringEngine::new(settings.scoring.clone(), settings.lifecycle.clone());
        Self {
            store,
            settings,
            rewriter,
            scorer,
            counter: TokenCounter::new(),
        }
    }

    pub fn store_ref(&self) -> &MemoryStore {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // ==================== store ====================

    /// Store a new memory: scrub, summarize, score, stamp an expiration,
    /// link entities, and record provenance, all in one transaction.
    pub fn store(&self, input: StoreInput) -> Result<Memory> {
        let content = scrub_sensitive(input.content.trim());
        if content.is_empty() {
            return Err(MemoryError::Validation("content must not be empty".into()));
        }

        let now = now_ms();
        let mut metadata = input.metadata;
        if let Some(source) = &input.source {
            metadata
                .entry("source".to_string())
                .or_insert_with(|| json!(source));
        }

        let base = match input.importance {
            Some(given) => given.clamp(0.0, lifecycle::IMPORTANCE_MAX),
            None => lifecycle::base_importance(
                &content,
                input.entities.len(),
                input.source.is_some(),
                input.memory_type,
            ),
        };
        let importance = lifecycle::adjust_importance(base, &content, &metadata);

        let memory = Memory {
            id: format!("mem_{}", Ulid::new()),
            summary: input
                .summary
                .unwrap_or_else(|| generate_summary(&content)),
            content,
            memory_type: input.memory_type,
            importance,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            expires_at: lifecycle::expiration(now, importance),
            metadata,
            is_deleted: false,
        };

        self.store.in_transaction(|store| {
            store.insert_memory(&memory)?;
            for entity in &input.entities {
                let id = store.upsert_entity(
                    &format!("ent_{}", Ulid::new()),
                    &entity.name,
                    &entity.entity_type,
                    now,
                )?;
                store.link_entity(&memory.id, &id)?;
            }
            store.insert_provenance(&Provenance {
                memory_id: memory.id.clone(),
                operation: Operation::Create,
                timestamp: now,
                source: input.source.clone(),
                context: None,
                user_id: None,
                changes: None,
            })?;
            Ok(())
        })?;

        info!(
            id = %memory.id,
            memory_type = %memory.memory_type,
            importance = memory.importance,
            "Memory stored"
        );
        Ok(memory)
    }

    // ==================== recall ====================

    /// Recall: rewrite, search, rank, window, budget, and attribute access
    /// to the memories actually surfaced in the detail window.
    pub fn recall(&self, options: RecallOptions) -> Result<RecallResponse> {
        let limit = options
            .limit
            .unwrap_or(self.settings.search.default_limit)
            .min(self.settings.search.max_limit)
            .max(1);
        let max_tokens = options
            .max_tokens
            .unwrap_or(self.settings.search.default_max_tokens);

        let rewritten = self.rewriter.rewrite(&options.query)?;
        let now = now_ms();

        let search_options = {
            let mut o = SearchOptions::new(limit);
            if let Some(t) = options.memory_type {
                o = o.with_type(t);
            }
            o.with_entities(options.entities.clone())
        };

        self.store.in_transaction(|store| {
            let executor = SearchExecutor::new(store);
            let set = executor.execute(&rewritten, &search_options, now)?;
            let ranked = self.scorer.rank(set, now);
            let total_count = ranked.len();

            let index: Vec<IndexEntry> = ranked
                .iter()
                .map(|s| IndexEntry {
                    id: s.memory.id.clone(),
                    memory_type: s.memory.memory_type.as_str().to_string(),
                    summary: s.memory.summary.clone(),
                    score: s.score,
                })
                .collect();

            let window: Vec<&ScoredMemory> = ranked.iter().take(limit).collect();

            let mut details = Vec::new();
            let mut tokens_used = 0;
            for scored in &window {
                let entities: Vec<String> = store
                    .entities_for_memory(&scored.memory.id)?
                    .into_iter()
                    .map(|e| e.name)
                    .collect();
                let view =
                    MemoryView::render(&scored.memory, options.detail, scored.score, &entities);
                let cost = self.counter.count_view(&view);
                // The first detail always ships, even when it alone is
                // over budget; otherwise a large memory could make recall
                // return nothing useful.
                if !details.is_empty() && tokens_used + cost > max_tokens {
                    break;
                }
                tokens_used += cost;
                details.push(view);
            }

            for view in &details {
                if let Some(scored) = window.iter().find(|s| s.memory.id == view.id()) {
                    self.record_access(store, &scored.memory, now)?;
                }
            }

            let has_more = details.len() < total_count;
            debug!(
                total = total_count,
                detailed = details.len(),
                tokens = tokens_used,
                "Recall completed"
            );
            Ok(RecallResponse {
                query: rewritten.match_expr.clone(),
                index,
                details,
                total_count,
                has_more,
                tokens_used,
            })
        })
    }

    /// Apply access-time lifecycle effects to one surfaced memory:
    /// bump the access counter, boost importance inside the early window,
    /// and extend (never shorten) the expiration when a refresh applies.
    fn record_access(&self, store: &MemoryStore, memory: &Memory, now: i64) -> Result<()> {
        let idle_before = memory.idle_days(now);
        let mut updated = memory.clone();
        updated.access_count += 1;
        updated.last_accessed = now;
        updated.importance = lifecycle::access_boost(
            updated.importance,
            updated.access_count,
            updated.age_days(now),
        );
        if let Some(current) = updated.expires_at {
            if let Some(candidate) =
                lifecycle::refresh_expiration(updated.importance, idle_before, now)
            {
                updated.expires_at = Some(current.max(candidate));
            }
        }
        store.update_memory(&updated)?;
        store.insert_provenance(&Provenance {
            memory_id: updated.id.clone(),
            operation: Operation::Access,
            timestamp: now,
            source: Some("recall".to_string()),
            context: None,
            user_id: None,
            changes: None,
        })
    }

    // ==================== update ====================

    /// Update fields of an existing memory by id or unique id prefix.
    ///
    /// Expiration is recomputed when importance changes, but only ever
    /// extends; a memory never loses lifetime through an update.
    pub fn update(&self, id_or_prefix: &str, fields: UpdateFields) -> Result<Memory> {
        let now = now_ms();
        self.store.in_transaction(|store| {
            let id = store
                .resolve_id(id_or_prefix)?
                .ok_or_else(|| MemoryError::NotFound(id_or_prefix.to_string()))?;
            let mut memory = store
                .get_memory(&id)?
                .ok_or_else(|| MemoryError::NotFound(id.clone()))?;

            let mut changes = serde_json::Map::new();

            if let Some(content) = fields.content {
                let content = scrub_sensitive(content.trim());
                if content.is_empty() {
                    return Err(MemoryError::Validation("content must not be empty".into()));
                }
                changes.insert("content".into(), json!({"from_len": memory.content.len()}));
                if fields.summary.is_none() {
                    memory.summary = generate_summary(&content);
                }
                memory.content = content;
            }
            if let Some(summary) = fields.summary {
                memory.summary = summary;
            }
            if let Some(memory_type) = fields.memory_type {
                changes.insert(
                    "type".into(),
                    json!({"from": memory.memory_type.as_str(), "to": memory_type.as_str()}),
                );
                memory.memory_type = memory_type;
            }
            if let Some(extra) = fields.metadata {
                for (k, v) in extra {
                    memory.metadata.insert(k, v);
                }
            }
            if let Some(importance) = fields.importance {
                let clamped = lifecycle::adjust_importance(
                    importance.clamp(0.0, lifecycle::IMPORTANCE_MAX),
                    &memory.content,
                    &memory.metadata,
                );
                changes.insert(
                    "importance".into(),
                    json!({"from": memory.importance, "to": clamped}),
                );
                memory.importance = clamped;
                memory.expires_at =
                    match (memory.expires_at, lifecycle::expiration(now, clamped)) {
                        (Some(current), Some(candidate)) => Some(current.max(candidate)),
                        // Crossing into the permanent tier clears the
                        // expiration; an existing permanent stays permanent.
                        _ => None,
                    };
            }
            memory.last_accessed = now;

            store.update_memory(&memory)?;
            store.insert_provenance(&Provenance {
                memory_id: memory.id.clone(),
                operation: Operation::Update,
                timestamp: now,
                source: None,
                context: fields.reason.clone(),
                user_id: None,
                changes: if changes.is_empty() {
                    None
                } else {
                    Some(Value::Object(changes))
                },
            })?;
            info!(id = %memory.id, "Memory updated");
            Ok(memory)
        })
    }

    // ==================== forget ====================

    /// Soft-delete a memory by id or unique id prefix. The record stays
    /// recoverable until prune purges it past the retention window.
    pub fn forget(&self, id_or_prefix: &str, reason: Option<String>) -> Result<ForgetResponse> {
        let now = now_ms();
        self.store.in_transaction(|store| {
            let id = store
                .resolve_id(id_or_prefix)?
                .ok_or_else(|| MemoryError::NotFound(id_or_prefix.to_string()))?;
            let mut memory = store
                .get_memory(&id)?
                .ok_or_else(|| MemoryError::NotFound(id.clone()))?;
            memory.is_deleted = true;
            store.update_memory(&memory)?;
            store.insert_provenance(&Provenance {
                memory_id: memory.id.clone(),
                operation: Operation::Delete,
                timestamp: now,
                source: None,
                context: reason.clone(),
                user_id: None,
                changes: None,
            })?;
            info!(id = %memory.id, "Memory forgotten");
            Ok(ForgetResponse {
                id: memory.id,
                summary: memory.summary,
            })
        })
    }

    // ==================== prune ====================

    /// Purge expired memories, soft-deleted memories past retention, and
    /// orphaned entities. With `dry_run` the report carries the exact
    /// counts a real run would remove, and nothing changes.
    pub fn prune(&self, older_than_days: Option<u32>, dry_run: bool) -> Result<PruneReport> {
        let now = now_ms();
        let retention = older_than_days.unwrap_or(self.settings.lifecycle.retention_days);
        let cutoff = lifecycle::purge_cutoff(now, retention);

        self.store.in_transaction(|store| {
            let report = if dry_run {
                let expired_count = store.count_expired(now)? as usize;
                let deleted_count = store.count_deleted_before(cutoff)? as usize;
                PruneReport {
                    dry_run: true,
                    pruned_count: expired_count + deleted_count,
                    expired_count,
                    deleted_count,
                    orphaned_entities: store.count_entities_orphaned_by(now, cutoff)? as usize,
                }
            } else {
                let expired_count = store.delete_expired(now)?;
                let deleted_count = store.delete_soft_deleted_before(cutoff)?;
                let orphaned_entities = store.delete_orphan_entities()?;
                PruneReport {
                    dry_run: false,
                    pruned_count: expired_count + deleted_count,
                    expired_count,
                    deleted_count,
                    orphaned_entities,
                }
            };
            info!(
                dry_run = report.dry_run,
                expired = report.expired_count,
                deleted = report.deleted_count,
                orphans = report.orphaned_entities,
                "Prune completed"
            );
            Ok(report)
        })
    }

    // ==================== inspection ====================

    /// Fetch one memory by id or unique id prefix.
    pub fn get(&self, id_or_prefix: &str) -> Result<Memory> {
        let id = self
            .store
            .resolve_id(id_or_prefix)?
            .ok_or_else(|| MemoryError::NotFound(id_or_prefix.to_string()))?;
        self.store
            .get_memory(&id)?
            .ok_or_else(|| MemoryError::NotFound(id))
    }

    /// List active memories, most recent first.
    pub fn list(&self, limit: usize) -> Result<Vec<Memory>> {
        self.store.list_active(limit)
    }
}
