/// Default upper bound for a single blob: 10 MiB.
pub const DEFAULT_MAX_BLOB_BYTES: u64 = 10 * 1024 * 1024;

/// Configuration for blob operations
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Absolute max size allowed for a single blob (safety guard)
    pub max_blob_bytes: u64,

    /// Content type recorded when the caller does not supply one
    pub fallback_content_type: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            max_blob_bytes: DEFAULT_MAX_BLOB_BYTES,
            fallback_content_type: "application/octet-stream".to_string(),
        }
    }
}

impl BlobConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max blob size
    pub fn with_max_blob_bytes(mut self, bytes: u64) -> Self {
        self.max_blob_bytes = bytes;
        self
    }

    pub fn with_fallback_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.fallback_content_type = content_type.into();
        self
    }
}
