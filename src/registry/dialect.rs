//! Adapted dialects: a base dialect whose driver module is served through a
//! [`DriverProxy`].

use crate::error::{OffloadError, OffloadResult};
use crate::models::Value;
use crate::proxy::{DriverProxy, ExecutionContext};
use crate::registry::resolver::{BaseDialect, DialectParameter, ResolveError, registry_key};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Backends whose connections must stay on one thread.
const SINGLE_THREAD_BACKENDS: &[&str] = &["sqlite"];

/// Name of the adapted dialect for a (backend, driver) pair.
///
/// Each part is capitalised and the parts are joined, e.g. `postgresql` +
/// `psycopg2` gives `PostgresqlPsycopg2Dialect`.
pub fn dialect_name(backend: &str, driver: Option<&str>) -> String {
    let mut name: String = [Some(backend), driver]
        .into_iter()
        .flatten()
        .map(capitalize)
        .collect();
    name.push_str("Dialect");
    name
}

fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A base dialect adapted to offload its driver calls.
pub struct OffloadDialect {
    name: String,
    backend: String,
    driver: Option<String>,
    base: Arc<dyn BaseDialect>,
    context: ExecutionContext,
}

impl OffloadDialect {
    pub fn new(backend: &str, driver: Option<&str>, base: Arc<dyn BaseDialect>) -> Self {
        let context = ExecutionContext::new()
            .single_threaded(SINGLE_THREAD_BACKENDS.contains(&backend));
        Self {
            name: dialect_name(backend, driver),
            backend: backend.to_string(),
            driver: driver.map(str::to_string),
            base,
            context,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn driver(&self) -> Option<&str> {
        self.driver.as_deref()
    }

    /// `backend` or `backend.driver`.
    pub fn key(&self) -> String {
        registry_key(&self.backend, self.driver())
    }

    /// Context handed to every driver proxy of this dialect.
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Constructor parameters, identical to the base dialect's.
    pub fn parameters(&self) -> &[DialectParameter] {
        self.base.parameters()
    }

    /// The driver module, wrapped in an offloading proxy.
    pub fn dbapi(&self) -> Result<DriverProxy, ResolveError> {
        Ok(DriverProxy::new(self.base.dbapi()?, self.context.clone()))
    }

    /// Bind constructor options the way the base dialect would.
    ///
    /// Unknown names and missing required parameters are rejected; omitted
    /// optional parameters take their declared defaults.
    pub fn instantiate(&self, mut options: BTreeMap<String, Value>) -> OffloadResult<DialectInstance> {
        let mut bound = BTreeMap::new();
        for param in self.parameters() {
            let value = match (options.remove(&param.name), &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => default.clone(),
                (None, None) => {
                    return Err(OffloadError::invalid_argument(format!(
                        "{}() missing required argument '{}'",
                        self.name, param.name
                    )));
                }
            };
            bound.insert(param.name.clone(), value);
        }

        if let Some(unexpected) = options.keys().next() {
            return Err(OffloadError::invalid_argument(format!(
                "{}() got an unexpected keyword argument '{}'",
                self.name, unexpected
            )));
        }

        Ok(DialectInstance {
            name: self.name.clone(),
            options: bound,
        })
    }
}

impl std::fmt::Debug for OffloadDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffloadDialect")
            .field("name", &self.name)
            .field("backend", &self.backend)
            .field("driver", &self.driver)
            .field("context", &self.context)
            .finish()
    }
}

/// A dialect with its constructor options bound.
#[derive(Debug, Clone, PartialEq)]
pub struct DialectInstance {
    name: String,
    options: BTreeMap<String, Value>,
}

impl DialectInstance {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    pub fn options(&self) -> &BTreeMap<String, Value> {
        &self.options
    }
}
