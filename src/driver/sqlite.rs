//! Bundled SQLite driver built on `rusqlite`.
//!
//! Behaves like a classic DB-API sqlite module: qmark parameters, implicit
//! transactions before data-modifying statements, and connections that refuse
//! to be used from any thread other than the one that opened them unless
//! `check_same_thread` is switched off. That last rule is why the registry
//! runs every sqlite call on the dedicated single-worker pool.

use crate::driver::{Dbapi, DriverError, DriverErrorKind, DriverResult, RawConnection, RawCursor};
use crate::models::{ColumnDescription, ConnectParams, DEFAULT_ARRAYSIZE, Row, Value};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{ErrorCode, params_from_iter};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::debug;

/// The `sqlite` driver module.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDbapi;

impl SqliteDbapi {
    pub fn new() -> Self {
        Self
    }
}

impl Dbapi for SqliteDbapi {
    fn threadsafety(&self) -> u8 {
        1
    }

    fn paramstyle(&self) -> &str {
        "qmark"
    }

    fn connect(&self, params: &ConnectParams) -> DriverResult<Box<dyn RawConnection>> {
        let database = params
            .first_str()
            .or_else(|| params.get_str("database"))
            .ok_or_else(|| {
                DriverError::programming("connect() missing required argument 'database'")
            })?
            .to_string();

        let check_same_thread = params
            .get("check_same_thread")
            .and_then(Value::as_i64)
            .is_none_or(|v| v != 0);
        // isolation_level=None puts the connection in autocommit mode
        let autocommit = matches!(params.get("isolation_level"), Some(Value::Null));
        let timeout = busy_timeout(params.get("timeout"))?;

        let conn = rusqlite::Connection::open(&database).map_err(map_sqlite_err)?;
        if let Some(timeout) = timeout {
            conn.busy_timeout(timeout).map_err(map_sqlite_err)?;
        }

        debug!(database = %database, check_same_thread, autocommit, "Opened sqlite connection");

        Ok(Box::new(SqliteConnection {
            conn: Arc::new(Mutex::new(Some(conn))),
            owner: thread::current().id(),
            check_same_thread,
            autocommit,
        }))
    }
}

/// sqlite stores the busy timeout as an `int` of milliseconds.
const MAX_BUSY_TIMEOUT_MS: u128 = i32::MAX as u128;

/// Parse the `timeout` connect argument, in seconds.
fn busy_timeout(value: Option<&Value>) -> DriverResult<Option<Duration>> {
    let secs = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Integer(v)) => *v as f64,
        Some(Value::Real(v)) => *v,
        Some(other) => {
            return Err(DriverError::programming(format!(
                "timeout must be a number, not {}",
                other.type_name()
            )));
        }
    };
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|timeout| timeout.as_millis() <= MAX_BUSY_TIMEOUT_MS)
        .map(Some)
        .ok_or_else(|| DriverError::new(DriverErrorKind::Data, format!("timeout out of range: {secs}")))
}

type SharedConnection = Arc<Mutex<Option<rusqlite::Connection>>>;

fn lock(conn: &SharedConnection) -> MutexGuard<'_, Option<rusqlite::Connection>> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

fn check_thread(owner: ThreadId, enabled: bool) -> DriverResult<()> {
    let current = thread::current().id();
    if enabled && current != owner {
        return Err(DriverError::programming(format!(
            "SQLite objects created in a thread can only be used in that same thread. \
             The object was created in thread {owner:?} and this is thread {current:?}."
        )));
    }
    Ok(())
}

fn closed_database() -> DriverError {
    DriverError::programming("Cannot operate on a closed database.")
}

/// Statements that open an implicit transaction.
fn is_dml(sql: &str) -> bool {
    let keyword = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("");
    ["INSERT", "UPDATE", "DELETE", "REPLACE"]
        .iter()
        .any(|k| keyword.eq_ignore_ascii_case(k))
}

/// A connection opened by [`SqliteDbapi`].
pub struct SqliteConnection {
    conn: SharedConnection,
    owner: ThreadId,
    check_same_thread: bool,
    autocommit: bool,
}

impl SqliteConnection {
    fn finish_transaction(&mut self, statement: &str) -> DriverResult<()> {
        check_thread(self.owner, self.check_same_thread)?;
        let guard = lock(&self.conn);
        let conn = guard.as_ref().ok_or_else(closed_database)?;
        if !conn.is_autocommit() {
            conn.execute_batch(statement).map_err(map_sqlite_err)?;
        }
        Ok(())
    }
}

impl RawConnection for SqliteConnection {
    fn close(&mut self) -> DriverResult<()> {
        check_thread(self.owner, self.check_same_thread)?;
        if let Some(conn) = lock(&self.conn).take() {
            conn.close().map_err(|(_, e)| map_sqlite_err(e))?;
        }
        Ok(())
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.finish_transaction("COMMIT")
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.finish_transaction("ROLLBACK")
    }

    fn cursor(&mut self) -> DriverResult<Box<dyn RawCursor>> {
        check_thread(self.owner, self.check_same_thread)?;
        if lock(&self.conn).is_none() {
            return Err(closed_database());
        }
        Ok(Box::new(SqliteCursor {
            conn: Arc::clone(&self.conn),
            owner: self.owner,
            check_same_thread: self.check_same_thread,
            autocommit: self.autocommit,
            rows: VecDeque::new(),
            description: None,
            rowcount: -1,
            lastrowid: None,
            arraysize: DEFAULT_ARRAYSIZE,
            closed: false,
        }))
    }
}

/// A cursor over a [`SqliteConnection`]. Result rows are buffered on execute.
pub struct SqliteCursor {
    conn: SharedConnection,
    owner: ThreadId,
    check_same_thread: bool,
    autocommit: bool,
    rows: VecDeque<Row>,
    description: Option<Vec<ColumnDescription>>,
    rowcount: i64,
    lastrowid: Option<i64>,
    arraysize: usize,
    closed: bool,
}

impl SqliteCursor {
    fn check_open(&self) -> DriverResult<()> {
        check_thread(self.owner, self.check_same_thread)?;
        if self.closed {
            return Err(DriverError::programming("Cannot operate on a closed cursor."));
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.rows.clear();
        self.description = None;
        self.rowcount = -1;
    }
}

impl RawCursor for SqliteCursor {
    fn description(&self) -> Option<Vec<ColumnDescription>> {
        self.description.clone()
    }

    fn rowcount(&self) -> i64 {
        self.rowcount
    }

    fn lastrowid(&self) -> Option<i64> {
        self.lastrowid
    }

    fn arraysize(&self) -> usize {
        self.arraysize
    }

    fn set_arraysize(&mut self, size: usize) {
        self.arraysize = size;
    }

    fn close(&mut self) -> DriverResult<()> {
        check_thread(self.owner, self.check_same_thread)?;
        self.reset();
        self.closed = true;
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> DriverResult<()> {
        self.check_open()?;
        self.reset();

        let guard = lock(&self.conn);
        let conn = guard.as_ref().ok_or_else(closed_database)?;
        let dml = is_dml(sql);
        if dml && !self.autocommit && conn.is_autocommit() {
            conn.execute_batch("BEGIN").map_err(map_sqlite_err)?;
        }

        let mut stmt = conn.prepare(sql).map_err(map_sqlite_err)?;
        let column_count = stmt.column_count();

        if column_count == 0 {
            let changed = stmt
                .execute(params_from_iter(params.iter()))
                .map_err(map_sqlite_err)?;
            if dml {
                self.rowcount = changed as i64;
                self.lastrowid = Some(conn.last_insert_rowid());
            }
            return Ok(());
        }

        let description: Vec<ColumnDescription> = stmt
            .column_names()
            .into_iter()
            .map(|name| ColumnDescription::new(name, None))
            .collect();

        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(map_sqlite_err)?;
        let mut buffered = VecDeque::new();
        while let Some(row) = rows.next().map_err(map_sqlite_err)? {
            let mut values = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                let value = row.get_ref(idx).map_err(map_sqlite_err)?;
                values.push(value_from_ref(value, &description[idx].name)?);
            }
            buffered.push_back(values);
        }

        self.rows = buffered;
        self.description = Some(description);
        Ok(())
    }

    fn executemany(&mut self, sql: &str, seq_of_params: &[Vec<Value>]) -> DriverResult<()> {
        self.check_open()?;
        self.reset();

        let guard = lock(&self.conn);
        let conn = guard.as_ref().ok_or_else(closed_database)?;
        let mut stmt = conn.prepare(sql).map_err(map_sqlite_err)?;
        if stmt.column_count() > 0 {
            return Err(DriverError::programming(
                "executemany() can only execute DML statements.",
            ));
        }
        if is_dml(sql) && !self.autocommit && conn.is_autocommit() {
            conn.execute_batch("BEGIN").map_err(map_sqlite_err)?;
        }

        let mut total = 0i64;
        for params in seq_of_params {
            total += stmt
                .execute(params_from_iter(params.iter()))
                .map_err(map_sqlite_err)? as i64;
        }
        self.rowcount = total;
        self.lastrowid = Some(conn.last_insert_rowid());
        Ok(())
    }

    fn fetchone(&mut self) -> DriverResult<Option<Row>> {
        self.check_open()?;
        Ok(self.rows.pop_front())
    }

    fn fetchall(&mut self) -> DriverResult<Vec<Row>> {
        self.check_open()?;
        Ok(self.rows.drain(..).collect())
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(v) => ToSqlOutput::from(*v),
            Value::Real(v) => ToSqlOutput::from(*v),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Blob(b) => ToSqlOutput::from(b.as_slice()),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>, column: &str) -> DriverResult<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(t) => match std::str::from_utf8(t) {
            Ok(text) => Value::Text(text.to_string()),
            Err(_) => {
                return Err(DriverError::operational(format!(
                    "Could not decode to UTF-8 column '{column}' with text '{}'",
                    String::from_utf8_lossy(t)
                )));
            }
        },
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    })
}

/// Map a `rusqlite::Error` onto the DB-API exception it corresponds to.
pub(crate) fn map_sqlite_err(err: rusqlite::Error) -> DriverError {
    let kind = match &err {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::ConstraintViolation => DriverErrorKind::Integrity,
            ErrorCode::TooBig | ErrorCode::TypeMismatch => DriverErrorKind::Data,
            ErrorCode::InternalMalfunction => DriverErrorKind::Internal,
            ErrorCode::ApiMisuse => DriverErrorKind::Programming,
            ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => DriverErrorKind::Database,
            _ => DriverErrorKind::Operational,
        },
        rusqlite::Error::InvalidParameterCount(_, _)
        | rusqlite::Error::InvalidParameterName(_)
        | rusqlite::Error::ExecuteReturnedResults
        | rusqlite::Error::MultipleStatement => DriverErrorKind::Programming,
        rusqlite::Error::InvalidColumnIndex(_) | rusqlite::Error::InvalidColumnType(..) => {
            DriverErrorKind::Data
        }
        _ => DriverErrorKind::Interface,
    };
    let message = match err {
        rusqlite::Error::SqliteFailure(_, Some(msg)) => msg,
        other => other.to_string(),
    };
    DriverError::new(kind, message)
}
