//! Offloading proxies over the raw driver objects.
//!
//! Each level wraps one driver object and one [`ExecutionContext`]:
//! - [`DriverProxy`] wraps a [`Dbapi`](crate::driver::Dbapi) module and yields
//!   connection proxies,
//! - [`ConnectionProxy`] wraps a connection and yields cursor proxies,
//! - [`CursorProxy`] wraps a cursor.
//!
//! Every method listed in the context's offload set is submitted to a worker
//! pool and awaited; everything else runs inline on the caller's thread.
//! Cursor attributes are served from a snapshot refreshed after each call, so
//! reading them never waits on a worker.

pub mod connection;
pub mod context;
pub mod cursor;
pub mod driver;

pub use connection::ConnectionProxy;
pub use context::{CONNECTION_METHODS, CURSOR_METHODS, ExecutionContext, Method};
pub use cursor::CursorProxy;
pub use driver::DriverProxy;

use crate::driver::DriverResult;
use crate::error::OffloadResult;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use tracing::trace;

/// Forward-or-offload dispatch shared by the connection and cursor proxies.
pub(crate) struct Proxy<T: ?Sized> {
    inner: Arc<Mutex<Box<T>>>,
    context: Arc<ExecutionContext>,
}

impl<T: ?Sized + Send + 'static> Proxy<T> {
    pub(crate) fn new(inner: Box<T>, context: ExecutionContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
            context: Arc::new(context),
        }
    }

    pub(crate) fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub(crate) fn inner(&self) -> &Arc<Mutex<Box<T>>> {
        &self.inner
    }

    /// Run `f` against the wrapped object, on a worker if `method` is offloaded.
    ///
    /// A method outside the offload set runs on the caller's thread, unless a
    /// worker currently holds the object. Then it queues on the pool behind
    /// that call instead of blocking the scheduler thread.
    pub(crate) async fn call<R, F>(&self, method: Method, f: F) -> OffloadResult<R>
    where
        F: FnOnce(&mut T) -> DriverResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let f = if self.context.offloads(method) {
            f
        } else {
            match try_inline(&self.inner, f) {
                Ok(result) => {
                    trace!(method = %method, "Called inline");
                    return Ok(result?);
                }
                Err(f) => {
                    trace!(method = %method, "Object busy on a worker, queueing call");
                    f
                }
            }
        };

        let pool = self.context.resolve_pool()?;
        trace!(method = %method, pool = %pool.name(), "Offloading call");
        let inner = Arc::clone(&self.inner);
        let result = pool.submit(move || f(&mut **lock(&inner))).await?;
        Ok(result?)
    }
}

/// Run `f` now if the object is free. Hands `f` back if a worker holds it.
fn try_inline<T, R, F>(inner: &Mutex<Box<T>>, f: F) -> Result<DriverResult<R>, F>
where
    T: ?Sized,
    F: FnOnce(&mut T) -> DriverResult<R>,
{
    let mut guard = match inner.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        Err(TryLockError::WouldBlock) => return Err(f),
    };
    Ok(f(&mut **guard))
}

impl<T: ?Sized> Clone for Proxy<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            context: Arc::clone(&self.context),
        }
    }
}

pub(crate) fn lock<T: ?Sized>(inner: &Mutex<Box<T>>) -> MutexGuard<'_, Box<T>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}
