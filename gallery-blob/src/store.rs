use async_trait::async_trait;
use chrono::Datelike;
use std::collections::BTreeMap;

use crate::{Annotations, BlobResult, ByteStream};

/// Core blob storage operations - must be implemented by all storage backends
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a blob from a stream, replacing any blob already at `key`
    async fn put(
        &self,
        key: &str,
        content_type: Option<&str>,
        annotations: &Annotations,
        stream: ByteStream,
    ) -> BlobResult<PutResult>;

    /// Get a blob as a stream
    async fn get(&self, key: &str) -> BlobResult<GetResult>;

    /// Get blob metadata without content
    async fn head(&self, key: &str) -> BlobResult<ObjectHead>;

    /// Delete a blob. Missing blobs yield `BlobError::NotFound`.
    async fn delete(&self, key: &str) -> BlobResult<()>;

    /// Public URL under which the blob at `key` is reachable
    fn url_for(&self, key: &str) -> String;

    /// Cheap reachability probe used by health checks
    async fn ping(&self) -> BlobResult<()>;

    /// Get store capabilities
    fn capabilities(&self) -> StoreCapabilities;
}

/// Result of a successful put operation
#[derive(Debug, Clone)]
pub struct PutResult {
    pub etag: Option<String>,
    pub size_bytes: u64,
}

/// Result of a get operation
pub struct GetResult {
    pub stream: ByteStream,
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

/// Metadata about a blob
#[derive(Debug, Clone)]
pub struct ObjectHead {
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<i64>,
    pub annotations: Annotations,
}

/// Store capabilities
#[derive(Debug, Clone, Default)]
pub struct StoreCapabilities {
    /// Blobs survive a process restart
    pub durable: bool,
}

impl StoreCapabilities {
    pub fn basic() -> Self {
        Self::default()
    }

    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }
}

/// Key hint carrying the file extension (without the dot).
pub const HINT_EXTENSION: &str = "extension";

/// Strategy for generating blob keys
pub trait BlobKeyStrategy: Send + Sync {
    /// Generate a key for a blob
    fn object_key(&self, prefix: &str, blob_id: &str, hints: &BTreeMap<String, String>) -> String;
}

/// Default key strategy: prefix/year/month/blob_id.ext
#[derive(Debug, Clone)]
pub struct DefaultKeyStrategy;

impl BlobKeyStrategy for DefaultKeyStrategy {
    fn object_key(&self, prefix: &str, blob_id: &str, hints: &BTreeMap<String, String>) -> String {
        let now = chrono::Utc::now();
        let ext = hints
            .get(HINT_EXTENSION)
            .map(|e| sanitize_extension(e))
            .filter(|e| !e.is_empty())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();

        format!(
            "{}/{:04}/{:02}/{}{}",
            prefix,
            now.year(),
            now.month(),
            blob_id,
            ext
        )
    }
}

fn sanitize_extension(raw: &str) -> String {
    raw.trim_start_matches('.')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_ascii_lowercase()
}
