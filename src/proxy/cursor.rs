//! Cursor proxy.

use crate::driver::{DriverResult, RawCursor};
use crate::error::OffloadResult;
use crate::models::{ColumnDescription, Row, Value};
use crate::proxy::{ExecutionContext, Method, Proxy};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Attribute values as of the last completed cursor call.
#[derive(Debug, Clone)]
struct CursorAttributes {
    description: Option<Vec<ColumnDescription>>,
    rowcount: i64,
    lastrowid: Option<i64>,
    arraysize: usize,
}

impl CursorAttributes {
    fn capture(cursor: &dyn RawCursor) -> Self {
        Self {
            description: cursor.description(),
            rowcount: cursor.rowcount(),
            lastrowid: cursor.lastrowid(),
            arraysize: cursor.arraysize(),
        }
    }

    // arraysize is owned by the proxy and pushed to the cursor before each call
    fn refresh(&mut self, cursor: &dyn RawCursor) {
        self.description = cursor.description();
        self.rowcount = cursor.rowcount();
        self.lastrowid = cursor.lastrowid();
    }
}

fn lock_attrs(attrs: &Mutex<CursorAttributes>) -> MutexGuard<'_, CursorAttributes> {
    attrs.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Proxy over a driver cursor.
///
/// The ten DB-API cursor methods follow the context's offload set. The
/// attribute readers (`description`, `rowcount`, `lastrowid`, `arraysize`)
/// answer from a snapshot taken when the last call finished, so they never
/// wait for a call that is still running on a worker.
#[derive(Clone)]
pub struct CursorProxy {
    proxy: Proxy<dyn RawCursor>,
    attrs: Arc<Mutex<CursorAttributes>>,
}

impl CursorProxy {
    pub fn new(inner: Box<dyn RawCursor>, context: ExecutionContext) -> Self {
        let attrs = CursorAttributes::capture(inner.as_ref());
        Self {
            proxy: Proxy::new(inner, context),
            attrs: Arc::new(Mutex::new(attrs)),
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        self.proxy.context()
    }

    pub fn description(&self) -> Option<Vec<ColumnDescription>> {
        lock_attrs(&self.attrs).description.clone()
    }

    pub fn rowcount(&self) -> i64 {
        lock_attrs(&self.attrs).rowcount
    }

    pub fn lastrowid(&self) -> Option<i64> {
        lock_attrs(&self.attrs).lastrowid
    }

    pub fn arraysize(&self) -> usize {
        lock_attrs(&self.attrs).arraysize
    }

    /// Takes effect on the cursor from the next call on.
    pub fn set_arraysize(&self, size: usize) {
        lock_attrs(&self.attrs).arraysize = size;
    }

    /// Dispatch `f` and refresh the attribute snapshot once it has run.
    async fn call<R, F>(&self, method: Method, f: F) -> OffloadResult<R>
    where
        F: FnOnce(&mut dyn RawCursor) -> DriverResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let attrs = Arc::clone(&self.attrs);
        self.proxy
            .call(method, move |cursor| {
                let arraysize = lock_attrs(&attrs).arraysize;
                cursor.set_arraysize(arraysize);
                let result = f(&mut *cursor);
                lock_attrs(&attrs).refresh(&*cursor);
                result
            })
            .await
    }

    pub async fn callproc(
        &self,
        procname: impl Into<String>,
        params: Vec<Value>,
    ) -> OffloadResult<Vec<Value>> {
        let procname = procname.into();
        self.call(Method::Callproc, move |cursor| cursor.callproc(&procname, &params))
            .await
    }

    pub async fn close(&self) -> OffloadResult<()> {
        self.call(Method::Close, |cursor| cursor.close()).await
    }

    /// Execute one statement. Returns the cursor so fetches can be chained.
    pub async fn execute(
        &self,
        sql: impl Into<String>,
        params: Vec<Value>,
    ) -> OffloadResult<&Self> {
        let sql = sql.into();
        self.call(Method::Execute, move |cursor| cursor.execute(&sql, &params))
            .await?;
        Ok(self)
    }

    pub async fn executemany(
        &self,
        sql: impl Into<String>,
        seq_of_params: Vec<Vec<Value>>,
    ) -> OffloadResult<&Self> {
        let sql = sql.into();
        self.call(Method::Executemany, move |cursor| {
            cursor.executemany(&sql, &seq_of_params)
        })
        .await?;
        Ok(self)
    }

    pub async fn fetchone(&self) -> OffloadResult<Option<Row>> {
        self.call(Method::Fetchone, |cursor| cursor.fetchone()).await
    }

    pub async fn fetchmany(&self, size: Option<usize>) -> OffloadResult<Vec<Row>> {
        self.call(Method::Fetchmany, move |cursor| cursor.fetchmany(size))
            .await
    }

    pub async fn fetchall(&self) -> OffloadResult<Vec<Row>> {
        self.call(Method::Fetchall, |cursor| cursor.fetchall()).await
    }

    pub async fn nextset(&self) -> OffloadResult<Option<bool>> {
        self.call(Method::Nextset, |cursor| cursor.nextset()).await
    }

    pub async fn setinputsizes(&self, sizes: Vec<Option<usize>>) -> OffloadResult<()> {
        self.call(Method::Setinputsizes, move |cursor| cursor.setinputsizes(&sizes))
            .await
    }

    pub async fn setoutputsize(&self, size: usize, column: Option<usize>) -> OffloadResult<()> {
        self.call(Method::Setoutputsize, move |cursor| {
            cursor.setoutputsize(size, column)
        })
        .await
    }
}

impl std::fmt::Debug for CursorProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorProxy")
            .field("context", self.context())
            .finish()
    }
}
