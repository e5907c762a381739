//! Schema DDL and bootstrap.
//!
//! The FTS5 table is an external-content mirror of `memories`; triggers
//! keep it in sync so the match index never drifts from the row data.

use tracing::info;

use memory_types::Result;

use crate::driver::{Driver, Value};

/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id            TEXT PRIMARY KEY,
    content       TEXT NOT NULL,
    summary       TEXT NOT NULL,
    type          TEXT NOT NULL DEFAULT 'fact',
    importance    REAL NOT NULL DEFAULT 5.0,
    created_at    INTEGER NOT NULL,
    last_accessed INTEGER NOT NULL,
    access_count  INTEGER NOT NULL DEFAULT 0,
    expires_at    INTEGER,
    metadata      TEXT,
    is_deleted    INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(type);
CREATE INDEX IF NOT EXISTS idx_memories_expires ON memories(expires_at);
CREATE INDEX IF NOT EXISTS idx_memories_deleted ON memories(is_deleted);

CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    content,
    summary,
    content='memories',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, content, summary)
    VALUES (new.rowid, new.content, new.summary);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, content, summary)
    VALUES ('delete', old.rowid, old.content, old.summary);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, content, summary)
    VALUES ('delete', old.rowid, old.content, old.summary);
    INSERT INTO memories_fts(rowid, content, summary)
    VALUES (new.rowid, new.content, new.summary);
END;

CREATE TABLE IF NOT EXISTS entities (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    type        TEXT NOT NULL,
    metadata    TEXT,
    created_at  INTEGER NOT NULL,
    UNIQUE(name, type)
);

CREATE TABLE IF NOT EXISTS memory_entities (
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    PRIMARY KEY (memory_id, entity_id)
);

CREATE TABLE IF NOT EXISTS provenance (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    memory_id TEXT NOT NULL,
    operation TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    source    TEXT,
    context   TEXT,
    user_id   TEXT,
    changes   TEXT
);

CREATE INDEX IF NOT EXISTS idx_provenance_memory
    ON provenance(memory_id, timestamp DESC);
"#;

/// Whether the schema has been created.
pub fn is_initialized(driver: &dyn Driver) -> Result<bool> {
    let found = driver.fetch_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'memories'",
        &[],
    )?;
    Ok(found.is_some())
}

/// Create all tables, indexes, and triggers, and stamp the version.
pub fn initialize_schema(driver: &dyn Driver) -> Result<()> {
    driver.execute_batch(SCHEMA_DDL)?;
    driver.pragma("user_version", &SCHEMA_VERSION.to_string())?;
    info!(version = SCHEMA_VERSION, "Initialized database schema");
    Ok(())
}

/// Stored schema version, 0 when never stamped.
pub fn schema_version(driver: &dyn Driver) -> Result<i64> {
    let v = driver.fetch_scalar("PRAGMA user_version", &[])?;
    Ok(v.and_then(|v| v.as_integer()).unwrap_or(0))
}

/// Rebuild the FTS index from the content table (maintenance path for
/// databases imported from other tools).
pub fn rebuild_fts(driver: &dyn Driver) -> Result<()> {
    driver.execute(
        "INSERT INTO memories_fts(memories_fts) VALUES ('rebuild')",
        &[] as &[Value],
    )?;
    info!("Rebuilt full-text index");
    Ok(())
}
