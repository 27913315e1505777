//! Raw blocking driver interface.
//!
//! These traits describe the synchronous call surface of a DB-API style driver:
//! a module that connects, connections that hand out cursors, and cursors that
//! execute statements and fetch rows. Every method here may block; the proxy
//! layer in [`crate::proxy`] decides which of them run on a worker thread.
//!
//! Drivers never see the proxies. A driver written against these traits works
//! unchanged whether it is called directly or through a [`crate::DriverProxy`].

pub mod sqlite;

use crate::models::{ColumnDescription, ConnectParams, DEFAULT_ARRAYSIZE, Row, Value};

pub use sqlite::SqliteDbapi;

/// DB-API exception classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverErrorKind {
    Warning,
    Interface,
    Database,
    Data,
    Operational,
    Integrity,
    Internal,
    Programming,
    NotSupported,
}

impl DriverErrorKind {
    /// The DB-API class name for this kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Warning => "Warning",
            Self::Interface => "InterfaceError",
            Self::Database => "DatabaseError",
            Self::Data => "DataError",
            Self::Operational => "OperationalError",
            Self::Integrity => "IntegrityError",
            Self::Internal => "InternalError",
            Self::Programming => "ProgrammingError",
            Self::NotSupported => "NotSupportedError",
        }
    }
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An error raised by a driver call.
///
/// The proxies return these exactly as the driver produced them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn interface(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Interface, message)
    }

    pub fn operational(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Operational, message)
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Integrity, message)
    }

    pub fn programming(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Programming, message)
    }

    /// The error a driver raises for an optional method it does not implement.
    pub fn not_supported(method: &str) -> Self {
        Self::new(
            DriverErrorKind::NotSupported,
            format!("{method}() is not supported by this driver"),
        )
    }
}

/// Result type alias for raw driver calls.
pub type DriverResult<T> = Result<T, DriverError>;

/// A driver module: the entry point that opens connections.
pub trait Dbapi: Send + Sync {
    /// Supported DB-API level.
    fn apilevel(&self) -> &str {
        "2.0"
    }

    /// Thread safety level the driver advertises (0-3).
    fn threadsafety(&self) -> u8;

    /// Parameter marker style, e.g. `qmark` or `pyformat`.
    fn paramstyle(&self) -> &str;

    /// Open a connection. May block on network or disk I/O.
    fn connect(&self, params: &ConnectParams) -> DriverResult<Box<dyn RawConnection>>;
}

/// An open driver connection.
pub trait RawConnection: Send {
    fn close(&mut self) -> DriverResult<()>;

    fn commit(&mut self) -> DriverResult<()>;

    fn rollback(&mut self) -> DriverResult<()>;

    fn cursor(&mut self) -> DriverResult<Box<dyn RawCursor>>;
}

/// A cursor over one connection.
pub trait RawCursor: Send {
    /// Columns of the last result set, `None` if the last statement returned no rows.
    fn description(&self) -> Option<Vec<ColumnDescription>>;

    /// Rows affected or returned by the last statement, -1 when unknown.
    fn rowcount(&self) -> i64;

    fn lastrowid(&self) -> Option<i64> {
        None
    }

    fn arraysize(&self) -> usize;

    fn set_arraysize(&mut self, size: usize);

    fn callproc(&mut self, _procname: &str, _params: &[Value]) -> DriverResult<Vec<Value>> {
        Err(DriverError::not_supported("callproc"))
    }

    fn close(&mut self) -> DriverResult<()>;

    fn execute(&mut self, sql: &str, params: &[Value]) -> DriverResult<()>;

    fn executemany(&mut self, sql: &str, seq_of_params: &[Vec<Value>]) -> DriverResult<()>;

    fn fetchone(&mut self) -> DriverResult<Option<Row>>;

    fn fetchmany(&mut self, size: Option<usize>) -> DriverResult<Vec<Row>> {
        let size = size.unwrap_or_else(|| self.arraysize().max(DEFAULT_ARRAYSIZE));
        let mut rows = Vec::with_capacity(size);
        while rows.len() < size {
            match self.fetchone()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    fn fetchall(&mut self) -> DriverResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetchone()? {
            rows.push(row);
        }
        Ok(rows)
    }

    fn nextset(&mut self) -> DriverResult<Option<bool>> {
        Err(DriverError::not_supported("nextset"))
    }

    // DB-API allows both sizing hints to be no-ops.
    fn setinputsizes(&mut self, _sizes: &[Option<usize>]) -> DriverResult<()> {
        Ok(())
    }

    fn setoutputsize(&mut self, _size: usize, _column: Option<usize>) -> DriverResult<()> {
        Ok(())
    }
}
