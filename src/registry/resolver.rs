//! Resolution of (backend, driver) pairs to base dialects.

use crate::driver::{Dbapi, SqliteDbapi};
use crate::models::Value;
use std::sync::Arc;

/// Errors raised while resolving a driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The driver is not available in this build.
    #[error("Driver '{key}' is not available")]
    Unavailable { key: String },

    /// The driver exists but could not be loaded.
    #[error("Failed to load driver '{key}': {message}")]
    Failed { key: String, message: String },
}

impl ResolveError {
    pub fn unavailable(backend: &str, driver: Option<&str>) -> Self {
        Self::Unavailable {
            key: registry_key(backend, driver),
        }
    }

    pub fn failed(backend: &str, driver: Option<&str>, message: impl Into<String>) -> Self {
        Self::Failed {
            key: registry_key(backend, driver),
            message: message.into(),
        }
    }
}

/// `backend` or `backend.driver`.
pub fn registry_key(backend: &str, driver: Option<&str>) -> String {
    match driver {
        Some(driver) => format!("{backend}.{driver}"),
        None => backend.to_string(),
    }
}

/// One constructor parameter of a dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct DialectParameter {
    pub name: String,
    /// `None` marks a required parameter.
    pub default: Option<Value>,
}

impl DialectParameter {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }
}

/// A backend dialect as provided by the database access layer.
pub trait BaseDialect: Send + Sync {
    /// The raw, blocking driver module.
    fn dbapi(&self) -> Result<Arc<dyn Dbapi>, ResolveError>;

    /// Constructor parameters, in declaration order.
    fn parameters(&self) -> &[DialectParameter] {
        &[]
    }
}

/// Looks up the base dialect for a (backend, driver) pair.
pub trait DriverResolver: Send + Sync {
    fn resolve(
        &self,
        backend: &str,
        driver: Option<&str>,
    ) -> Result<Arc<dyn BaseDialect>, ResolveError>;
}

/// Resolver for the drivers compiled into this crate (sqlite only).
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinResolver;

impl DriverResolver for BuiltinResolver {
    fn resolve(
        &self,
        backend: &str,
        driver: Option<&str>,
    ) -> Result<Arc<dyn BaseDialect>, ResolveError> {
        match (backend, driver) {
            ("sqlite", None | Some("pysqlite")) => Ok(Arc::new(SqliteDialect::new())),
            _ => Err(ResolveError::unavailable(backend, driver)),
        }
    }
}

/// Base dialect for the bundled sqlite driver.
#[derive(Debug, Clone)]
pub struct SqliteDialect {
    parameters: Vec<DialectParameter>,
}

impl SqliteDialect {
    pub fn new() -> Self {
        Self {
            parameters: vec![
                DialectParameter::optional("isolation_level", Value::Null),
                DialectParameter::optional("native_datetime", false),
                DialectParameter::optional("json_serializer", Value::Null),
                DialectParameter::optional("json_deserializer", Value::Null),
            ],
        }
    }
}

impl Default for SqliteDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseDialect for SqliteDialect {
    fn dbapi(&self) -> Result<Arc<dyn Dbapi>, ResolveError> {
        Ok(Arc::new(SqliteDbapi::new()))
    }

    fn parameters(&self) -> &[DialectParameter] {
        &self.parameters
    }
}
