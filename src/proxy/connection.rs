//! Connection proxy.

use crate::driver::RawConnection;
use crate::error::OffloadResult;
use crate::proxy::{CURSOR_METHODS, CursorProxy, ExecutionContext, Method, Proxy, lock};
use std::sync::Arc;

/// Proxy over a driver connection.
///
/// `close`, `commit` and `rollback` follow the context's offload set.
/// `cursor` always runs on a worker and wraps its result in a [`CursorProxy`].
#[derive(Clone)]
pub struct ConnectionProxy {
    proxy: Proxy<dyn RawConnection>,
}

impl ConnectionProxy {
    pub fn new(inner: Box<dyn RawConnection>, context: ExecutionContext) -> Self {
        Self {
            proxy: Proxy::new(inner, context),
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        self.proxy.context()
    }

    pub async fn close(&self) -> OffloadResult<()> {
        self.proxy.call(Method::Close, |conn| conn.close()).await
    }

    pub async fn commit(&self) -> OffloadResult<()> {
        self.proxy.call(Method::Commit, |conn| conn.commit()).await
    }

    pub async fn rollback(&self) -> OffloadResult<()> {
        self.proxy.call(Method::Rollback, |conn| conn.rollback()).await
    }

    pub async fn cursor(&self) -> OffloadResult<CursorProxy> {
        let pool = self.context().resolve_pool()?;
        let inner = Arc::clone(self.proxy.inner());
        let raw = pool.submit(move || lock(&inner).cursor()).await??;
        Ok(CursorProxy::new(
            raw,
            self.context().with_methods(CURSOR_METHODS),
        ))
    }
}

impl std::fmt::Debug for ConnectionProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProxy")
            .field("context", self.context())
            .finish()
    }
}
