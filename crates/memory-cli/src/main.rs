//! Persistent memory CLI.
//!
//! # Usage
//!
//! ```bash
//! memory store "The bonsai needs watering on Mondays" --entity bonsai:plant
//! memory search "bonsai watering" --detail full
//! memory forget mem_01ARZ3
//! memory prune --dry-run
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/memory-store/config.toml)
//! 3. Environment variables (MEMORY_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use memory_cli::{
    handle_forget, handle_import, handle_list, handle_prune, handle_search, handle_show,
    handle_stats, handle_store, handle_update, open_engine, Cli, Commands,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let engine = open_engine(
        cli.config.as_deref(),
        cli.log_level.as_deref(),
        cli.db_path.as_deref(),
    )?;

    match cli.command {
        Commands::Store {
            content,
            memory_type,
            importance,
            entities,
            metadata,
        } => {
            handle_store(&engine, content, &memory_type, importance, &entities, &metadata)?;
        }
        Commands::Search {
            query,
            limit,
            memory_type,
            entities,
            detail,
            max_tokens,
            json,
        } => {
            handle_search(
                &engine,
                query,
                limit,
                memory_type.as_deref(),
                entities,
                &detail,
                max_tokens,
                json,
            )?;
        }
        Commands::Show { id } => {
            handle_show(&engine, &id)?;
        }
        Commands::List { limit } => {
            handle_list(&engine, limit)?;
        }
        Commands::Update {
            id,
            content,
            importance,
            memory_type,
            metadata,
            reason,
        } => {
            handle_update(
                &engine,
                &id,
                content,
                importance,
                memory_type.as_deref(),
                &metadata,
                reason,
            )?;
        }
        Commands::Forget { id, reason } => {
            handle_forget(&engine, &id, reason)?;
        }
        Commands::Prune {
            older_than,
            dry_run,
        } => {
            handle_prune(&engine, older_than, dry_run)?;
        }
        Commands::Import { path, force } => {
            handle_import(&engine, &path, force)?;
        }
        Commands::Stats => {
            handle_stats(&engine)?;
        }
    }

    Ok(())
}
