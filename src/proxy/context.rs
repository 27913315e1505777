//! Offload policy carried from one proxy level to the next.

use crate::error::OffloadResult;
use crate::pool::{self, WorkerPool};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A method on one of the wrapped driver objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    Connect,
    Close,
    Commit,
    Rollback,
    Cursor,
    Callproc,
    Execute,
    Executemany,
    Fetchone,
    Fetchmany,
    Fetchall,
    Nextset,
    Setinputsizes,
    Setoutputsize,
}

impl Method {
    /// The DB-API method name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Close => "close",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
            Self::Cursor => "cursor",
            Self::Callproc => "callproc",
            Self::Execute => "execute",
            Self::Executemany => "executemany",
            Self::Fetchone => "fetchone",
            Self::Fetchmany => "fetchmany",
            Self::Fetchall => "fetchall",
            Self::Nextset => "nextset",
            Self::Setinputsizes => "setinputsizes",
            Self::Setoutputsize => "setoutputsize",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Methods offloaded on a connection.
pub const CONNECTION_METHODS: &[Method] = &[
    Method::Close,
    Method::Commit,
    Method::Rollback,
    Method::Cursor,
];

/// Methods offloaded on a cursor.
pub const CURSOR_METHODS: &[Method] = &[
    Method::Callproc,
    Method::Close,
    Method::Execute,
    Method::Executemany,
    Method::Fetchone,
    Method::Fetchmany,
    Method::Fetchall,
    Method::Nextset,
    Method::Setinputsizes,
    Method::Setoutputsize,
];

/// Which calls a proxy offloads, and where they run.
///
/// A context is never changed once a proxy holds it. Child proxies receive a
/// derived copy built with [`with_methods`](Self::with_methods) and
/// [`with_pool`](Self::with_pool).
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    offload_methods: BTreeSet<Method>,
    pool: Option<Arc<WorkerPool>>,
    single_thread: bool,
}

impl ExecutionContext {
    /// An empty context: nothing offloaded, default pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force every call onto the dedicated single-worker pool.
    pub fn single_threaded(mut self, enabled: bool) -> Self {
        self.single_thread = enabled;
        self
    }

    /// Copy of this context whose offloaded method set is exactly `methods`.
    pub fn with_methods(&self, methods: &[Method]) -> Self {
        Self {
            offload_methods: methods.iter().copied().collect(),
            ..self.clone()
        }
    }

    /// Copy of this context pinned to `pool`.
    pub fn with_pool(&self, pool: Arc<WorkerPool>) -> Self {
        Self {
            pool: Some(pool),
            ..self.clone()
        }
    }

    pub fn offloads(&self, method: Method) -> bool {
        self.offload_methods.contains(&method)
    }

    pub fn offload_methods(&self) -> impl Iterator<Item = Method> + '_ {
        self.offload_methods.iter().copied()
    }

    pub fn pool(&self) -> Option<&Arc<WorkerPool>> {
        self.pool.as_ref()
    }

    pub fn is_single_thread(&self) -> bool {
        self.single_thread
    }

    /// Pick the pool for the next call.
    ///
    /// Single-thread mode wins, then a pinned pool, then whatever the default
    /// pool is at the time of the call.
    pub fn resolve_pool(&self) -> OffloadResult<Arc<WorkerPool>> {
        if self.single_thread {
            return pool::dedicated_pool();
        }
        match &self.pool {
            Some(pool) => Ok(Arc::clone(pool)),
            None => pool::default_pool(),
        }
    }
}
