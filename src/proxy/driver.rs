//! Driver-module proxy.

use crate::driver::Dbapi;
use crate::error::OffloadResult;
use crate::models::ConnectParams;
use crate::proxy::{CONNECTION_METHODS, ConnectionProxy, ExecutionContext};
use std::sync::Arc;
use tracing::debug;

/// Proxy over a driver module. `connect` always runs on a worker.
#[derive(Clone)]
pub struct DriverProxy {
    inner: Arc<dyn Dbapi>,
    context: Arc<ExecutionContext>,
}

impl DriverProxy {
    pub fn new(inner: Arc<dyn Dbapi>, context: ExecutionContext) -> Self {
        Self {
            inner,
            context: Arc::new(context),
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn apilevel(&self) -> &str {
        self.inner.apilevel()
    }

    pub fn threadsafety(&self) -> u8 {
        self.inner.threadsafety()
    }

    pub fn paramstyle(&self) -> &str {
        self.inner.paramstyle()
    }

    /// Open a connection on a worker thread and wrap it.
    ///
    /// In single-thread mode the connection, and every cursor it creates, is
    /// pinned to the dedicated pool.
    pub async fn connect(&self, params: ConnectParams) -> OffloadResult<ConnectionProxy> {
        let pool = self.context.resolve_pool()?;
        debug!(pool = %pool.name(), params = ?params, "Connecting through worker pool");

        let inner = Arc::clone(&self.inner);
        let raw = pool.submit(move || inner.connect(&params)).await??;

        let mut context = self.context.with_methods(CONNECTION_METHODS);
        if self.context.is_single_thread() {
            context = context.with_pool(pool);
        }
        Ok(ConnectionProxy::new(raw, context))
    }
}

impl std::fmt::Debug for DriverProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverProxy")
            .field("paramstyle", &self.inner.paramstyle())
            .field("context", &self.context)
            .finish()
    }
}
