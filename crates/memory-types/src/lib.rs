//! # memory-types
//!
//! Shared domain types for the memory store:
//! - `Memory`: a stored fact with importance, TTL, and access statistics
//! - `Entity`: a named thing associated with one or more memories
//! - `Provenance`: append-only audit records for memory operations
//! - `Settings`: layered configuration
//! - `MemoryError`: the unified error taxonomy

pub mod config;
pub mod error;
pub mod memory;
pub mod provenance;

pub use config::{LifecycleSettings, ScoringWeights, SearchSettings, Settings};
pub use error::{MemoryError, Result};
pub use memory::{days_to_ms, format_ms, ms_to_days, now_ms, Entity, Memory, MemoryType, MS_PER_DAY};
pub use provenance::{Operation, Provenance};
