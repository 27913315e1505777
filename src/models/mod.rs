//! Data models for db-offload.
//!
//! This module re-exports the value types shared by drivers and proxies.

pub mod connection;
pub mod value;

// Re-export commonly used types
pub use connection::ConnectParams;
pub use value::{ColumnDescription, DEFAULT_ARRAYSIZE, Row, Value};
