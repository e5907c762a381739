//! # memory-cli
//!
//! The `memory` binary: argument parsing in `cli`, handlers in `commands`.

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{
    handle_forget, handle_import, handle_list, handle_prune, handle_search, handle_show,
    handle_stats, handle_store, handle_update, open_engine,
};
