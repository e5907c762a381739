//! Command handlers: thin glue between the parsed CLI and the engine.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

use memory_core::{
    DetailLevel, EntityRef, MemoryEngine, MemoryView, RecallOptions, StoreInput, UpdateFields,
};
use memory_types::{format_ms, Memory, MemoryType, Settings};

/// Rough chunk size for markdown import, in characters. Files larger than
/// this are split on paragraph boundaries so each memory stays readable.
const IMPORT_CHUNK_CHARS: usize = 4000;

/// Load settings (with CLI overrides), initialize logging, open the engine.
pub fn open_engine(
    config: Option<&str>,
    log_level: Option<&str>,
    db_path: Option<&str>,
) -> Result<MemoryEngine> {
    let mut settings = Settings::load(config).context("Failed to load configuration")?;
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    if let Some(path) = db_path {
        settings.db_path = path.to_string();
    }

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    debug!(db_path = %settings.db_path, "Opening memory store");
    Ok(MemoryEngine::open(settings)?)
}

pub fn parse_memory_type(s: &str) -> Result<MemoryType> {
    MemoryType::parse(s)
        .with_context(|| format!("Unknown memory type '{s}' (fact, entity, relationship, self)"))
}

fn parse_detail(s: &str) -> Result<DetailLevel> {
    match s {
        "minimal" => Ok(DetailLevel::Minimal),
        "standard" => Ok(DetailLevel::Standard),
        "full" => Ok(DetailLevel::Full),
        other => bail!("Unknown detail level '{other}' (minimal, standard, full)"),
    }
}

/// Parse NAME or NAME:TYPE entity arguments.
fn parse_entities(args: &[String]) -> Vec<EntityRef> {
    args.iter()
        .map(|arg| match arg.split_once(':') {
            Some((name, entity_type)) => EntityRef {
                name: name.to_string(),
                entity_type: entity_type.to_string(),
            },
            None => EntityRef {
                name: arg.clone(),
                entity_type: "other".to_string(),
            },
        })
        .collect()
}

/// Parse KEY=VALUE metadata arguments. Values that parse as JSON are kept
/// structured; everything else becomes a string.
fn parse_metadata(args: &[String]) -> Result<HashMap<String, serde_json::Value>> {
    let mut metadata = HashMap::new();
    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .with_context(|| format!("Metadata '{arg}' is not KEY=VALUE"))?;
        let parsed = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        metadata.insert(key.to_string(), parsed);
    }
    Ok(metadata)
}

// ==================== store ====================

pub fn handle_store(
    engine: &MemoryEngine,
    content: String,
    memory_type: &str,
    importance: Option<f64>,
    entities: &[String],
    metadata: &[String],
) -> Result<()> {
    let memory = engine.store(StoreInput {
        content,
        memory_type: parse_memory_type(memory_type)?,
        importance,
        entities: parse_entities(entities),
        metadata: parse_metadata(metadata)?,
        source: Some("cli".to_string()),
        summary: None,
    })?;

    println!("Stored {} (importance {:.1})", memory.id, memory.importance);
    println!("  {}", memory.summary);
    match memory.expires_at {
        Some(at) => println!("  expires {}", format_ms(at)),
        None => println!("  permanent"),
    }
    Ok(())
}

// ==================== search ====================

#[allow(clippy::too_many_arguments)]
pub fn handle_search(
    engine: &MemoryEngine,
    query: String,
    limit: Option<usize>,
    memory_type: Option<&str>,
    entities: Vec<String>,
    detail: &str,
    max_tokens: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut options = RecallOptions::new(query)
        .with_detail(parse_detail(detail)?)
        .with_entities(entities);
    if let Some(limit) = limit {
        options = options.with_limit(limit);
    }
    if let Some(t) = memory_type {
        options = options.with_type(parse_memory_type(t)?);
    }
    if let Some(budget) = max_tokens {
        options = options.with_max_tokens(budget);
    }

    let response = engine.recall(options)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.total_count == 0 {
        println!("No memories match.");
        return Ok(());
    }

    println!(
        "{} match{} ({} tokens of detail)",
        response.total_count,
        if response.total_count == 1 { "" } else { "es" },
        response.tokens_used
    );
    for entry in &response.index {
        println!("  {}  [{}] {:.3}  {}", entry.id, entry.memory_type, entry.score, entry.summary);
    }

    for view in &response.details {
        println!();
        print_view(view);
    }
    if response.has_more {
        println!();
        println!("Index above lists further matches; raise --limit for more detail.");
    }
    Ok(())
}

fn print_view(view: &MemoryView) {
    match view {
        MemoryView::Minimal { id, memory_type, summary } => {
            println!("{id} [{memory_type}]");
            println!("  {summary}");
        }
        MemoryView::Standard {
            id,
            memory_type,
            summary,
            importance,
            created_at,
            last_accessed,
            score,
        } => {
            println!("{id} [{memory_type}] score {score:.3}");
            println!("  {summary}");
            println!("  importance {importance:.1}, created {created_at}, accessed {last_accessed}");
        }
        MemoryView::Full {
            id,
            memory_type,
            content,
            importance,
            created_at,
            access_count,
            expires_at,
            entities,
            score,
            ..
        } => {
            println!("{id} [{memory_type}] score {score:.3}");
            println!("  importance {importance:.1}, created {created_at}, {access_count} accesses");
            match expires_at {
                Some(at) => println!("  expires {at}"),
                None => println!("  permanent"),
            }
            if !entities.is_empty() {
                println!("  entities: {}", entities.join(", "));
            }
            println!("  {content}");
        }
    }
}

// ==================== show / list / stats ====================

pub fn handle_show(engine: &MemoryEngine, id: &str) -> Result<()> {
    let memory = engine.get(id)?;
    print_memory(&memory);
    Ok(())
}

fn print_memory(memory: &Memory) {
    println!("{} [{}]", memory.id, memory.memory_type);
    println!("  importance {:.1}", memory.importance);
    println!("  created   {}", format_ms(memory.created_at));
    println!(
        "  accessed  {} ({} times)",
        format_ms(memory.last_accessed),
        memory.access_count
    );
    match memory.expires_at {
        Some(at) => println!("  expires   {}", format_ms(at)),
        None => println!("  permanent"),
    }
    if memory.is_deleted {
        println!("  (soft-deleted)");
    }
    if !memory.metadata.is_empty() {
        if let Ok(json) = serde_json::to_string(&memory.metadata) {
            println!("  metadata  {json}");
        }
    }
    println!("  {}", memory.content);
}

pub fn handle_list(engine: &MemoryEngine, limit: usize) -> Result<()> {
    let memories = engine.list(limit)?;
    if memories.is_empty() {
        println!("No memories stored.");
        return Ok(());
    }
    for memory in &memories {
        println!(
            "{}  [{}] {:.1}  {}",
            memory.id, memory.memory_type, memory.importance, memory.summary
        );
    }
    Ok(())
}

pub fn handle_stats(engine: &MemoryEngine) -> Result<()> {
    let stats = engine.store_ref().stats()?;
    println!("Active memories:  {}", stats.active);
    println!("Soft-deleted:     {}", stats.deleted);
    println!("Database size:    {} KB", stats.db_bytes / 1024);
    if !stats.by_type.is_empty() {
        println!("By type:");
        for (memory_type, count) in &stats.by_type {
            println!("  {memory_type:<14} {count}");
        }
    }
    Ok(())
}

// ==================== update / forget / prune ====================

pub fn handle_update(
    engine: &MemoryEngine,
    id: &str,
    content: Option<String>,
    importance: Option<f64>,
    memory_type: Option<&str>,
    metadata: &[String],
    reason: Option<String>,
) -> Result<()> {
    let fields = UpdateFields {
        content,
        summary: None,
        importance,
        memory_type: memory_type.map(parse_memory_type).transpose()?,
        metadata: if metadata.is_empty() {
            None
        } else {
            Some(parse_metadata(metadata)?)
        },
        reason,
    };
    let memory = engine.update(id, fields)?;
    println!("Updated {} (importance {:.1})", memory.id, memory.importance);
    println!("  {}", memory.summary);
    Ok(())
}

pub fn handle_forget(engine: &MemoryEngine, id: &str, reason: Option<String>) -> Result<()> {
    let response = engine.forget(id, reason)?;
    println!("Forgot {}", response.id);
    println!("  {}", response.summary);
    println!("  (recoverable until pruned)");
    Ok(())
}

pub fn handle_prune(engine: &MemoryEngine, older_than: Option<u32>, dry_run: bool) -> Result<()> {
    let report = engine.prune(older_than, dry_run)?;
    let verb = if report.dry_run { "Would remove" } else { "Removed" };
    println!("{verb} {} expired memories", report.expired_count);
    println!("{verb} {} soft-deleted memories past retention", report.deleted_count);
    println!("{verb} {} orphaned entities", report.orphaned_entities);
    Ok(())
}

// ==================== import ====================

/// Import one markdown file, or every markdown file under a directory.
///
/// Each file becomes one memory, or several when it exceeds the chunk
/// size. Files already imported (matched by `metadata.source`) are
/// skipped unless `force` is set.
pub fn handle_import(engine: &MemoryEngine, path: &str, force: bool) -> Result<()> {
    let root = Path::new(path);
    if !root.exists() {
        bail!("Path does not exist: {path}");
    }

    let mut imported = 0usize;
    let mut skipped = 0usize;
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        match import_file(engine, entry.path(), force)? {
            0 => skipped += 1,
            n => imported += n,
        }
    }

    println!("Imported {imported} memories ({skipped} files skipped)");
    Ok(())
}

fn import_file(engine: &MemoryEngine, path: &Path, force: bool) -> Result<usize> {
    let source = path.to_string_lossy().to_string();
    // Chunked files carry a #chunkN suffix in their source, so check both.
    if !force
        && (engine.store_ref().source_exists(&source)?
            || engine.store_ref().source_exists(&format!("{source}#chunk1"))?)
    {
        debug!(source = %source, "Already imported, skipping");
        return Ok(0);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        warn!(source = %source, "Empty file, skipping");
        return Ok(0);
    }

    let chunks = chunk_markdown(&content);
    let total = chunks.len();
    for (i, chunk) in chunks.into_iter().enumerate() {
        let source = if total > 1 {
            format!("{source}#chunk{}", i + 1)
        } else {
            source.clone()
        };
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), serde_json::Value::String(source));
        engine.store(StoreInput {
            content: chunk,
            memory_type: MemoryType::Fact,
            importance: None,
            entities: Vec::new(),
            metadata,
            source: Some("import".to_string()),
            summary: None,
        })?;
    }
    Ok(total)
}

/// Split markdown into chunks of roughly `IMPORT_CHUNK_CHARS`, breaking on
/// blank lines so paragraphs stay whole. A single oversized paragraph
/// becomes its own chunk rather than being split mid-sentence.
fn chunk_markdown(content: &str) -> Vec<String> {
    let trimmed = content.trim();
    if trimmed.len() <= IMPORT_CHUNK_CHARS {
        return vec![trimmed.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for paragraph in trimmed.split("\n\n") {
        if !current.is_empty() && current.len() + paragraph.len() + 2 > IMPORT_CHUNK_CHARS {
            chunks.push(current.trim().to_string());
            current = String::new();
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }
    chunks
}
