//! Worker pools used to offload blocking driver calls.
//!
//! Two process-wide pools exist:
//! - the default pool, shared by every proxy without a pinned pool. It is looked
//!   up on every call, so [`set_default_pool`] affects calls made afterwards
//!   even through proxies that already exist.
//! - the dedicated pool, a single worker thread for the whole process, used by
//!   drivers whose connections must never be touched from two threads.

pub mod worker;

pub use worker::WorkerPool;

use crate::error::OffloadResult;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::info;

/// Default number of workers in the shared pool.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Name of the lazily-created shared pool.
pub const DEFAULT_POOL_NAME: &str = "db-offload-default";

/// Name of the single-worker pool.
pub const DEDICATED_POOL_NAME: &str = "db-offload-single";

static DEFAULT_POOL: RwLock<Option<Arc<WorkerPool>>> = RwLock::new(None);
static DEFAULT_POOL_SIZE_SETTING: AtomicUsize = AtomicUsize::new(DEFAULT_POOL_SIZE);
static DEDICATED_POOL: Mutex<Option<Arc<WorkerPool>>> = Mutex::new(None);

/// Get the current default pool, creating it on first use.
pub fn default_pool() -> OffloadResult<Arc<WorkerPool>> {
    if let Some(pool) = DEFAULT_POOL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        return Ok(Arc::clone(pool));
    }

    let mut slot = DEFAULT_POOL.write().unwrap_or_else(PoisonError::into_inner);
    // Re-check: another thread may have created it while we waited.
    if let Some(pool) = slot.as_ref() {
        return Ok(Arc::clone(pool));
    }
    let size = DEFAULT_POOL_SIZE_SETTING.load(Ordering::Relaxed);
    let pool = Arc::new(WorkerPool::new(DEFAULT_POOL_NAME, size)?);
    *slot = Some(Arc::clone(&pool));
    Ok(pool)
}

/// Replace the default pool. Returns the previous pool, if one was created.
///
/// Calls already in flight finish on the old pool.
pub fn set_default_pool(pool: Arc<WorkerPool>) -> Option<Arc<WorkerPool>> {
    info!(pool = %pool.name(), size = pool.size(), "Default worker pool replaced");
    DEFAULT_POOL
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(pool)
}

/// Set the size used when the default pool is created lazily.
///
/// Has no effect on a default pool that already exists.
pub fn configure_default_pool_size(size: usize) {
    DEFAULT_POOL_SIZE_SETTING.store(size, Ordering::Relaxed);
}

/// Get the process-wide single-worker pool, creating it on first use.
pub fn dedicated_pool() -> OffloadResult<Arc<WorkerPool>> {
    let mut slot = DEDICATED_POOL.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(pool) = slot.as_ref() {
        return Ok(Arc::clone(pool));
    }
    let pool = Arc::new(WorkerPool::new(DEDICATED_POOL_NAME, 1)?);
    *slot = Some(Arc::clone(&pool));
    Ok(pool)
}
