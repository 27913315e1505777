//! The capability registry adapted dialects are published to.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::info;

/// External registry mapping a dialect key to the module and type providing it.
pub trait CapabilityRegistry {
    fn register(&self, key: &str, module_name: &str, class_name: &str);
}

/// Where a registered dialect lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredDialect {
    pub module_name: String,
    pub class_name: String,
}

/// In-memory [`CapabilityRegistry`].
#[derive(Debug, Default)]
pub struct DialectRegistry {
    entries: RwLock<HashMap<String, RegisteredDialect>>,
}

impl DialectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a registered key.
    pub fn load(&self, key: &str) -> Option<RegisteredDialect> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.load(key).is_some()
    }

    /// All registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CapabilityRegistry for DialectRegistry {
    fn register(&self, key: &str, module_name: &str, class_name: &str) {
        let entry = RegisteredDialect {
            module_name: module_name.to_string(),
            class_name: class_name.to_string(),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), entry);
        info!(key = %key, module = %module_name, class = %class_name, "Registered dialect");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_load() {
        let registry = DialectRegistry::new();
        registry.register("sqlite", "db_offload", "SqliteDialect");

        assert!(registry.contains("sqlite"));
        assert_eq!(
            registry.load("sqlite"),
            Some(RegisteredDialect {
                module_name: "db_offload".to_string(),
                class_name: "SqliteDialect".to_string(),
            })
        );
        assert!(registry.load("mysql").is_none());
    }

    #[test]
    fn test_register_replaces_existing_key() {
        let registry = DialectRegistry::new();
        registry.register("sqlite", "a", "First");
        registry.register("sqlite", "b", "Second");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.load("sqlite").unwrap().class_name, "Second");
    }

    #[test]
    fn test_keys_sorted() {
        let registry = DialectRegistry::new();
        assert!(registry.is_empty());
        registry.register("sqlite.pysqlite", "m", "B");
        registry.register("sqlite", "m", "A");
        assert_eq!(registry.keys(), ["sqlite", "sqlite.pysqlite"]);
    }
}
