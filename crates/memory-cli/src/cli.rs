//! CLI argument parsing for the memory tool.
//!
//! CLI flags override the config file and environment variables.

use clap::{Parser, Subcommand};

/// Persistent Memory
///
/// A local persistent memory store for AI assistants: store facts, recall
/// them with ranked full-text search, and let unimportant ones expire.
#[derive(Parser, Debug)]
#[command(name = "memory")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/memory-store/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Memory commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store a new memory
    Store {
        /// Memory text
        content: String,

        /// Memory type (fact, entity, relationship, self)
        #[arg(short = 't', long, default_value = "fact")]
        memory_type: String,

        /// Explicit importance [0, 10]; computed from content when omitted
        #[arg(short, long)]
        importance: Option<f64>,

        /// Entity to link, as NAME or NAME:TYPE (repeatable)
        #[arg(short, long = "entity")]
        entities: Vec<String>,

        /// Metadata entry, as KEY=VALUE (repeatable)
        #[arg(short = 'm', long = "meta")]
        metadata: Vec<String>,
    },

    /// Search memories with ranked full-text recall
    Search {
        /// Natural-language query; quote phrases for exact adjacency
        query: String,

        /// Maximum detailed results
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Restrict to one memory type
        #[arg(short = 't', long)]
        memory_type: Option<String>,

        /// Restrict to memories linked to this entity (repeatable)
        #[arg(short, long = "entity")]
        entities: Vec<String>,

        /// Detail level (minimal, standard, full)
        #[arg(short, long, default_value = "standard")]
        detail: String,

        /// Token budget for the detail payload
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Emit the raw JSON response instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// Show one memory in full
    Show {
        /// Memory id or unique id prefix
        id: String,
    },

    /// List recent memories
    List {
        /// Maximum results
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Update fields of an existing memory
    Update {
        /// Memory id or unique id prefix
        id: String,

        /// New memory text
        #[arg(long)]
        content: Option<String>,

        /// New importance [0, 10]
        #[arg(short, long)]
        importance: Option<f64>,

        /// New memory type
        #[arg(short = 't', long)]
        memory_type: Option<String>,

        /// Metadata entry to merge, as KEY=VALUE (repeatable)
        #[arg(short = 'm', long = "meta")]
        metadata: Vec<String>,

        /// Reason recorded in the audit trail
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Soft-delete a memory (recoverable until pruned)
    Forget {
        /// Memory id or unique id prefix
        id: String,

        /// Reason recorded in the audit trail
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Purge expired and long-forgotten memories
    Prune {
        /// Retention override in days for soft-deleted memories
        #[arg(long)]
        older_than: Option<u32>,

        /// Report what would be removed without touching anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Import markdown files as memories
    Import {
        /// File or directory to import
        path: String,

        /// Re-import files whose source is already present
        #[arg(long)]
        force: bool,
    },

    /// Show store statistics
    Stats,
}
