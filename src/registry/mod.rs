//! Adapter registry.
//!
//! Builds one [`OffloadDialect`] per known (backend, driver) pair and publishes
//! them to a [`CapabilityRegistry`] under `backend` and `backend.driver` keys.
//! Pairs whose driver cannot be resolved are skipped without failing the rest.

pub mod capability;
pub mod dialect;
pub mod resolver;

pub use capability::{CapabilityRegistry, DialectRegistry, RegisteredDialect};
pub use dialect::{DialectInstance, OffloadDialect, dialect_name};
pub use resolver::{
    BaseDialect, BuiltinResolver, DialectParameter, DriverResolver, ResolveError, SqliteDialect,
    registry_key,
};

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Module name adapted dialects are registered under.
pub const MODULE_NAME: &str = "db_offload";

/// Known backends and their drivers.
pub const BUNDLED_DRIVERS: &[(&str, &[&str])] = &[
    ("drizzle", &["mysqldb"]),
    ("firebird", &["kinterbasdb", "fdb"]),
    (
        "mssql",
        &["pyodbc", "adodbapi", "pymssql", "zxjdbc", "mxodbc"],
    ),
    (
        "mysql",
        &[
            "mysqldb",
            "oursql",
            "pyodbc",
            "zxjdbc",
            "mysqlconnector",
            "pymysql",
            "gaerdbms",
            "cymysql",
        ],
    ),
    ("oracle", &["cx_oracle", "zxjdbc"]),
    ("postgresql", &["psycopg2", "pg8000", "pypostgresql", "zxjdbc"]),
    ("sqlite", &["pysqlite"]),
    ("sybase", &["pysybase", "pyodbc"]),
];

/// The set of adapted dialects, keyed by `backend` / `backend.driver`.
#[derive(Debug, Default)]
pub struct AdapterRegistry {
    entries: BTreeMap<String, Arc<OffloadDialect>>,
}

impl AdapterRegistry {
    /// Build adapted dialects for every pair in `known`.
    ///
    /// Each backend contributes a base entry (no driver) plus one entry per
    /// driver. An entry that fails to resolve is logged and skipped, and so is
    /// one whose resolver panics.
    pub fn build(resolver: &dyn DriverResolver, known: &[(&str, &[&str])]) -> Self {
        let mut entries = BTreeMap::new();

        for (backend, drivers) in known {
            let candidates = std::iter::once(None).chain(drivers.iter().map(|d| Some(*d)));
            for driver in candidates {
                let resolved =
                    panic::catch_unwind(AssertUnwindSafe(|| resolver.resolve(backend, driver)));
                match resolved {
                    Ok(Ok(base)) => {
                        let dialect = OffloadDialect::new(backend, driver, base);
                        debug!(key = %dialect.key(), name = %dialect.name(), "Built adapted dialect");
                        entries.insert(dialect.key(), Arc::new(dialect));
                    }
                    Ok(Err(err)) => {
                        debug!(
                            backend = %backend,
                            driver = driver.unwrap_or("-"),
                            error = %err,
                            "Skipping dialect"
                        );
                    }
                    Err(payload) => {
                        warn!(
                            backend = %backend,
                            driver = driver.unwrap_or("-"),
                            panic = panic_message(payload.as_ref()),
                            "Resolver panicked, skipping dialect"
                        );
                    }
                }
            }
        }

        info!(count = entries.len(), "Adapter registry built");
        Self { entries }
    }

    /// Registry of the drivers compiled into this crate.
    pub fn builtin() -> Self {
        Self::build(&BuiltinResolver, BUNDLED_DRIVERS)
    }

    /// Look up by `backend` or `backend.driver`.
    pub fn get(&self, key: &str) -> Option<&Arc<OffloadDialect>> {
        self.entries.get(key)
    }

    /// Look up by generated dialect name, e.g. `SqlitePysqliteDialect`.
    pub fn get_by_name(&self, name: &str) -> Option<&Arc<OffloadDialect>> {
        self.entries.values().find(|d| d.name() == name)
    }

    pub fn dialects(&self) -> impl Iterator<Item = &Arc<OffloadDialect>> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Publish every built entry. Returns the number of keys registered.
    pub fn register_all(&self, registry: &dyn CapabilityRegistry) -> usize {
        for (key, dialect) in &self.entries {
            registry.register(key, MODULE_NAME, dialect.name());
        }
        self.entries.len()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

static ADAPTERS: OnceLock<AdapterRegistry> = OnceLock::new();

/// The process-wide registry of builtin adapted dialects.
pub fn adapters() -> &'static AdapterRegistry {
    ADAPTERS.get_or_init(AdapterRegistry::builtin)
}

/// Register every builtin adapted dialect with `registry`.
pub fn patch_all(registry: &dyn CapabilityRegistry) -> usize {
    adapters().register_all(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_contains_only_sqlite() {
        let registry = AdapterRegistry::builtin();
        let keys: Vec<_> = registry.dialects().map(|d| d.key()).collect();
        assert_eq!(keys, ["sqlite", "sqlite.pysqlite"]);
    }

    #[test]
    fn test_lookup_by_key_and_name() {
        let registry = AdapterRegistry::builtin();
        let by_key = registry.get("sqlite.pysqlite").unwrap();
        let by_name = registry.get_by_name("SqlitePysqliteDialect").unwrap();
        assert!(Arc::ptr_eq(by_key, by_name));
        assert!(registry.get("postgresql").is_none());
    }

    #[test]
    fn test_patch_all_registers_builtin_keys() {
        let registry = DialectRegistry::new();
        assert_eq!(patch_all(&registry), 2);
        assert_eq!(
            registry.load("sqlite").unwrap(),
            RegisteredDialect {
                module_name: MODULE_NAME.to_string(),
                class_name: "SqliteDialect".to_string(),
            }
        );
        assert!(registry.contains("sqlite.pysqlite"));
        assert!(!registry.contains("postgresql.psycopg2"));
    }

    #[test]
    fn test_panic_message_reads_str_and_string_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("plain");
        assert_eq!(panic_message(payload.as_ref()), "plain");
        let payload: Box<dyn Any + Send> = Box::new(format!("formatted {}", 1));
        assert_eq!(panic_message(payload.as_ref()), "formatted 1");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_adapters_is_shared() {
        assert!(std::ptr::eq(adapters(), adapters()));
    }
}
