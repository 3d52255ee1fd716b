//! Snapshot of the process environment used during library discovery.
//!
//! The locator never reads `std::env` directly; it works from an
//! [`Environment`] captured once, so tests can build isolated snapshots.

use std::collections::HashMap;
use std::path::PathBuf;

pub const LD_LIBRARY_PATH: &str = "LD_LIBRARY_PATH";
pub const DYLD_LIBRARY_PATH: &str = "DYLD_LIBRARY_PATH";
pub const DYLD_FALLBACK_LIBRARY_PATH: &str = "DYLD_FALLBACK_LIBRARY_PATH";
pub const LD_RUN_PATH: &str = "LD_RUN_PATH";
pub const SHLIB_PATH: &str = "SHLIB_PATH";
pub const LIBPATH: &str = "LIBPATH";
pub const LIBRARY_PATH: &str = "LIBRARY_PATH";
pub const PATH: &str = "PATH";
pub const HOME: &str = "HOME";
pub const RESOURCEPATH: &str = "RESOURCEPATH";

/// Immutable view of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Captures the current process environment.
    ///
    /// Variables whose name or value is not valid UTF-8 are ignored.
    pub fn capture() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    /// Creates an empty environment.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates an environment from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self { vars }
    }

    /// Returns a copy with `name` set to `value`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Splits a path-list variable on `separator`, dropping empty entries.
    pub fn paths(&self, name: &str, separator: char) -> Vec<PathBuf> {
        self.get(name)
            .map(|value| {
                value
                    .split(separator)
                    .filter(|entry| !entry.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}
