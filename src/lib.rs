//! db-offload Library
//!
//! This library lets asynchronous code use blocking DB-API style database
//! drivers without stalling the async scheduler. Driver, connection and cursor
//! calls are wrapped in proxies that submit the blocking work to worker
//! threads and await the result.

pub mod config;
pub mod driver;
pub mod error;
pub mod models;
pub mod pool;
pub mod proxy;
pub mod registry;

pub use config::{Config, DatabaseUrl};
pub use error::{OffloadError, OffloadResult};
pub use pool::WorkerPool;
pub use proxy::{ConnectionProxy, CursorProxy, DriverProxy, ExecutionContext, Method};
pub use registry::{AdapterRegistry, OffloadDialect, adapters, patch_all};
