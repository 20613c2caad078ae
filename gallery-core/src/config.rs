//! # Gallery configuration
//!
//! A minimal string key/value store, set programmatically or layered from the
//! environment. Keys are dotted (`http.port`, `upload.max_bytes`).
//!
//! ```rust
//! use gallery_core::GalleryConfig;
//!
//! let mut config = GalleryConfig::new();
//! config.set("http.port", "8080");
//! assert_eq!(config.snapshot().get_u64("http.port"), Some(8080));
//! ```
//!
//! Environment variables are mapped by stripping a prefix, lowercasing and
//! turning `__` into `.`:
//!
//! ```bash
//! export GALLERY__UPLOAD__MAX_BYTES=5242880   # upload.max_bytes
//! ```

use std::collections::HashMap;

pub const ENV_PREFIX: &str = "GALLERY__";

#[derive(Debug, Default, Clone)]
pub struct GalleryConfig {
    values: HashMap<String, String>,
}

impl GalleryConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Config populated from the process environment using [`ENV_PREFIX`].
    pub fn from_env() -> Self {
        let mut config = Self::new();
        config.load_env(ENV_PREFIX);
        config
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Set a key only if nothing has set it yet.
    pub fn set_default<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Check whether a key is present.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Overlay every `{prefix}A__B=value` variable as `a.b = value`.
    pub fn load_env(&mut self, prefix: &str) {
        self.load_vars(prefix, std::env::vars());
    }

    pub fn load_vars<I>(&mut self, prefix: &str, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                if !normalized.is_empty() {
                    self.set(normalized, value);
                }
            }
        }
    }

    pub fn snapshot(&self) -> GalleryConfigSnapshot {
        GalleryConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct GalleryConfigSnapshot {
    map: HashMap<String, String>,
}

impl GalleryConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.trim().parse::<usize>().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.trim().parse::<bool>().ok())
    }
}
