use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::pin::Pin;
use uuid::Uuid;

use crate::{BlobError, BlobResult};

/// Stream of bytes for blob content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Opaque key/value pairs attached to a blob (object metadata on cloud stores).
pub type Annotations = BTreeMap<String, String>;

/// Content type guessed from a key's or filename's extension.
pub fn content_type_for_key(key: &str) -> Option<String> {
    mime_guess::from_path(key).first().map(|m| m.essence_str().to_string())
}

/// Unique identifier for a blob
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BlobId(pub String);

impl BlobId {
    /// Generate a new random blob ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BlobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BlobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request to store a blob
#[derive(Debug, Clone, Default)]
pub struct BlobPut {
    pub content_type: Option<String>,
    pub filename: Option<String>,
    pub size_hint: Option<u64>,
    pub annotations: Annotations,
    pub key_hints: BTreeMap<String, String>,
}

impl BlobPut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_filename<S: Into<String>>(mut self, filename: S) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    pub fn with_annotation<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_key_hint<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.key_hints.insert(key.into(), value.into());
        self
    }
}

/// Wrap an in-memory payload as a single-chunk stream.
pub fn stream_from_bytes(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    Box::pin(futures_util::stream::once(async move { Ok(data) }))
}

/// Drain a stream into one buffer.
pub async fn collect_stream(mut stream: ByteStream) -> BlobResult<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

/// Reject keys that are empty, absolute, or walk out of the store root.
pub fn validate_key(key: &str) -> BlobResult<()> {
    if key.is_empty() || key.len() > 1024 {
        return Err(BlobError::invalid("blob key must be 1..=1024 bytes"));
    }
    if key.starts_with('/') || key.contains('\\') || key.contains('\0') {
        return Err(BlobError::invalid(format!("illegal blob key: {key}")));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == ".." || segment.starts_with(".tmp"))
    {
        return Err(BlobError::invalid(format!("illegal blob key: {key}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_with_traversal_are_rejected() {
        assert!(validate_key("paintings/2024/05/a.jpg").is_ok());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("/abs/path").is_err());
        assert!(validate_key("a//b").is_err());
        assert!(validate_key("a/./b").is_err());
        assert!(validate_key("").is_err());
        assert!(validate_key(".tmp/x").is_err());
    }

    #[tokio::test]
    async fn collect_concatenates_chunks() {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"cd"))];
        let stream: ByteStream = Box::pin(futures_util::stream::iter(chunks));
        let data = collect_stream(stream).await.unwrap();
        assert_eq!(&data[..], b"abcd");
    }

    #[test]
    fn put_builder_collects_annotations_and_hints() {
        let put = BlobPut::new()
            .with_content_type("image/png")
            .with_annotation("section", "drawings")
            .with_key_hint("extension", "png")
            .with_size_hint(12);
        assert_eq!(put.content_type.as_deref(), Some("image/png"));
        assert_eq!(put.annotations.get("section").map(String::as_str), Some("drawings"));
        assert_eq!(put.key_hints.get("extension").map(String::as_str), Some("png"));
        assert_eq!(put.size_hint, Some(12));
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for_key("a/b.JPG").as_deref(), Some("image/jpeg"));
        assert_eq!(content_type_for_key("scans/page.jp2").as_deref(), Some("image/jp2"));
        assert_eq!(content_type_for_key("moon.png").as_deref(), Some("image/png"));
        assert_eq!(content_type_for_key("a/b"), None);
    }
}
