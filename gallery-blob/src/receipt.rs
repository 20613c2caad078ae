use serde::Serialize;

use crate::{Annotations, BlobId, ByteStream};

/// Receipt returned after successfully storing a blob
#[derive(Debug, Clone, Serialize)]
pub struct BlobReceipt {
    pub id: BlobId,
    pub key: String,
    pub url: String,
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub filename: Option<String>,
    pub etag: Option<String>,
    pub created_at: i64,
    pub annotations: Annotations,
}

/// Result of opening a blob for reading
pub struct OpenedBlob {
    pub key: String,
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub stream: ByteStream,
}

impl BlobReceipt {
    /// Create a new blob receipt
    pub fn new(id: BlobId, key: String, size_bytes: u64) -> Self {
        Self {
            id,
            key,
            url: String::new(),
            size_bytes,
            content_type: None,
            filename: None,
            etag: None,
            created_at: chrono::Utc::now().timestamp(),
            annotations: Annotations::new(),
        }
    }

    pub fn with_url<S: Into<String>>(mut self, url: S) -> Self {
        self.url = url.into();
        self
    }

    /// Set content type
    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set filename
    pub fn with_filename<S: Into<String>>(mut self, filename: S) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set etag
    pub fn with_etag<S: Into<String>>(mut self, etag: S) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_annotations(mut self, annotations: Annotations) -> Self {
        self.annotations = annotations;
        self
    }
}
