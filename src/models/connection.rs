//! Connection-related data models.
//!
//! This module defines the argument bundle handed to a driver's `connect`.

use crate::models::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Keyword arguments whose values are never printed.
const SENSITIVE_KEYS: &[&str] = &["password", "passwd", "pwd"];

/// Positional and keyword arguments for a driver's `connect` call.
///
/// The proxy layer forwards these untouched; only the driver interprets them.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: BTreeMap<String, Value>,
}

impl ConnectParams {
    /// Create an empty argument bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument, replacing any previous value.
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    /// Look up a keyword argument.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.kwargs.get(key)
    }

    /// Look up a text keyword argument.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// First positional argument, if it is text.
    pub fn first_str(&self) -> Option<&str> {
        self.args.first().and_then(Value::as_str)
    }
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let masked: BTreeMap<&str, &dyn std::fmt::Debug> = self
            .kwargs
            .iter()
            .map(|(k, v)| {
                let shown: &dyn std::fmt::Debug = if SENSITIVE_KEYS.contains(&k.as_str()) {
                    &"****"
                } else {
                    v
                };
                (k.as_str(), shown)
            })
            .collect();
        f.debug_struct("ConnectParams")
            .field("args", &self.args)
            .field("kwargs", &masked)
            .finish()
    }
}
