//! Storage layer for the memory store.
//!
//! Provides SQLite-backed storage behind an explicit driver seam:
//! - `Driver`: prepared-statement-style interface (execute, fetch,
//!   scalar, raw batch, pragma, transaction scoping, close)
//! - `SqliteDriver` / `EphemeralDriver`: file-backed and in-memory
//!   conforming implementations, chosen by `DriverConfig`
//! - `schema`: DDL for memories, the FTS5 mirror, entities, and provenance
//! - `MemoryStore`: typed row mapping and the SQL surface the core uses
//!
//! There is no ambient connection handle; the hosting application opens a
//! store once and passes it into every core operation.

pub mod driver;
pub mod schema;
pub mod store;

pub use driver::{open_driver, Driver, DriverConfig, EphemeralDriver, Row, SqliteDriver, Value};
pub use store::{MemoryStore, SearchFilters, SearchHit, StoreStats};
