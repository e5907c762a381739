//! Database driver abstraction.
//!
//! The core is written against the `Driver` trait only. Concrete drivers
//! are selected by caller-supplied `DriverConfig` at construction time,
//! never by environment inspection inside core logic.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode};
use tracing::debug;

use memory_types::{MemoryError, Result};

/// A scalar value crossing the driver boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Text content, if this value is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content, if this value is an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Real content; integers widen.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Integer(b as i64)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl rusqlite::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::ToSqlOutput;
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// One fetched row: column names paired with values.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    /// Look up a column by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, v)| v)
    }

    /// Required text column.
    pub fn text(&self, name: &str) -> Result<String> {
        self.get(name)
            .and_then(|v| v.as_text())
            .map(|s| s.to_string())
            .ok_or_else(|| MemoryError::storage("fetch", format!("missing text column {name}")))
    }

    /// Optional text column (NULL becomes None).
    pub fn opt_text(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(|v| v.as_text())
            .map(|s| s.to_string())
    }

    /// Required integer column.
    pub fn integer(&self, name: &str) -> Result<i64> {
        self.get(name)
            .and_then(|v| v.as_integer())
            .ok_or_else(|| MemoryError::storage("fetch", format!("missing integer column {name}")))
    }

    /// Optional integer column (NULL becomes None).
    pub fn opt_integer(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| v.as_integer())
    }

    /// Required real column; integers widen.
    pub fn real(&self, name: &str) -> Result<f64> {
        self.get(name)
            .and_then(|v| v.as_real())
            .ok_or_else(|| MemoryError::storage("fetch", format!("missing real column {name}")))
    }
}

/// Prepared-statement-style database interface.
///
/// Implementations serialize concurrent callers through the engine's
/// native single-writer discipline; a rejected concurrent write surfaces
/// as the retriable `MemoryError::Busy`.
pub trait Driver: Send {
    /// Execute a parameterized statement, returning affected row count.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize>;

    /// Fetch all rows for a parameterized query.
    fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Fetch the first row, if any.
    fn fetch_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>>;

    /// Fetch a single scalar from the first row, if any.
    fn fetch_scalar(&self, sql: &str, params: &[Value]) -> Result<Option<Value>>;

    /// Execute raw, possibly multi-statement SQL (DDL, maintenance).
    fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Set a pragma-style configuration value.
    fn pragma(&self, name: &str, value: &str) -> Result<()>;

    /// Begin an immediate (write-locking) transaction.
    fn begin(&self) -> Result<()>;

    /// Commit the open transaction.
    fn commit(&self) -> Result<()>;

    /// Roll back the open transaction.
    fn rollback(&self) -> Result<()>;

    /// Close the connection, flushing any driver-side state.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Driver selection, supplied by the hosting application.
#[derive(Debug, Clone)]
pub enum DriverConfig {
    /// Durable file-backed database (WAL mode).
    File(PathBuf),
    /// In-memory database; contents vanish on close. Used by tests and
    /// throwaway imports.
    Ephemeral,
}

/// Open the configured driver.
pub fn open_driver(config: &DriverConfig) -> Result<Box<dyn Driver>> {
    match config {
        DriverConfig::File(path) => Ok(Box::new(SqliteDriver::open(path)?)),
        DriverConfig::Ephemeral => Ok(Box::new(EphemeralDriver::open()?)),
    }
}

fn map_sqlite_err(op: &str, err: rusqlite::Error) -> MemoryError {
    if let rusqlite::Error::SqliteFailure(e, _) = &err {
        if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) {
            return MemoryError::Busy(err.to_string());
        }
    }
    MemoryError::storage(op, err.to_string())
}

/// File-backed SQLite driver.
///
/// The connection is guarded by a mutex; SQLite's single-writer lock
/// provides cross-process serialization on top of that.
pub struct SqliteDriver {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDriver {
    /// Open (or create) a database file and apply connection pragmas.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| MemoryError::storage("open", e.to_string()))?;
            }
        }
        let conn = Connection::open(&path).map_err(|e| map_sqlite_err("open", e))?;
        debug!(path = %path.display(), "Opened database");
        let driver = Self::from_connection(conn);
        driver.pragma("journal_mode", "WAL")?;
        driver.pragma("synchronous", "NORMAL")?;
        driver.pragma("foreign_keys", "ON")?;
        driver.pragma("busy_timeout", "5000")?;
        Ok(driver)
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn with_conn<F, T>(&self, op: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| MemoryError::storage(op, format!("connection poisoned: {e}")))?;
        f(&conn).map_err(|e| map_sqlite_err(op, e))
    }
}

fn value_from_ref(v: ValueRef<'_>) -> rusqlite::Result<Value> {
    Ok(match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    })
}

fn collect_rows(
    conn: &Connection,
    sql: &str,
    params: &[Value],
    limit: Option<usize>,
) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut columns = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            columns.push((name.clone(), value_from_ref(row.get_ref(i)?)?));
        }
        out.push(Row { columns });
        if limit.is_some_and(|l| out.len() >= l) {
            break;
        }
    }
    Ok(out)
}

impl Driver for SqliteDriver {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        self.with_conn("execute", |conn| {
            conn.execute(sql, rusqlite::params_from_iter(params.iter()))
        })
    }

    fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.with_conn("fetch_all", |conn| collect_rows(conn, sql, params, None))
    }

    fn fetch_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        self.with_conn("fetch_one", |conn| {
            collect_rows(conn, sql, params, Some(1)).map(|mut rows| rows.pop())
        })
    }

    fn fetch_scalar(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        let row = self.fetch_one(sql, params)?;
        Ok(row.and_then(|r| r.columns.into_iter().next().map(|(_, v)| v)))
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        self.with_conn("execute_batch", |conn| conn.execute_batch(sql))
    }

    fn pragma(&self, name: &str, value: &str) -> Result<()> {
        // journal_mode and friends return a result row; run as a query.
        self.with_conn("pragma", |conn| {
            let sql = format!("PRAGMA {name} = {value}");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            while rows.next()?.is_some() {}
            Ok(())
        })
    }

    fn begin(&self) -> Result<()> {
        self.with_conn("begin", |conn| {
            conn.execute_batch("BEGIN IMMEDIATE")
        })
    }

    fn commit(&self) -> Result<()> {
        self.with_conn("commit", |conn| conn.execute_batch("COMMIT"))
    }

    fn rollback(&self) -> Result<()> {
        self.with_conn("rollback", |conn| conn.execute_batch("ROLLBACK"))
    }

    fn close(self: Box<Self>) -> Result<()> {
        // Dropping the last Arc reference closes the connection.
        drop(self);
        Ok(())
    }
}

/// In-memory SQLite driver for tests and throwaway work.
pub struct EphemeralDriver {
    inner: SqliteDriver,
}

impl EphemeralDriver {
    /// Open a fresh in-memory database.
    pub fn open() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| map_sqlite_err("open", e))?;
        let inner = SqliteDriver::from_connection(conn);
        inner.pragma("foreign_keys", "ON")?;
        Ok(Self { inner })
    }
}

impl Driver for EphemeralDriver {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        self.inner.execute(sql, params)
    }

    fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.inner.fetch_all(sql, params)
    }

    fn fetch_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        self.inner.fetch_one(sql, params)
    }

    fn fetch_scalar(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        self.inner.fetch_scalar(sql, params)
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        self.inner.execute_batch(sql)
    }

    fn pragma(&self, name: &str, value: &str) -> Result<()> {
        self.inner.pragma(name, value)
    }

    fn begin(&self) -> Result<()> {
        self.inner.begin()
    }

    fn commit(&self) -> Result<()> {
        self.inner.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.inner.rollback()
    }

    fn close(self: Box<Self>) -> Result<()> {
        Box::new(self.inner).close()
    }
}
