use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{
    BlobConfig, BlobError, BlobId, BlobKeyStrategy, BlobPut, BlobReceipt, BlobResult, BlobStore,
    ByteStream, DefaultKeyStrategy, OpenedBlob, StoreCapabilities,
};

/// The blob adapter embedded by the asset layer: key generation, size guard and receipts
/// on top of a raw [`BlobStore`].
#[derive(Clone)]
pub struct BlobAdapter {
    store: Arc<dyn BlobStore>,
    keys: Arc<dyn BlobKeyStrategy>,
    config: BlobConfig,
}

impl BlobAdapter {
    /// Create a new blob adapter
    pub fn new(store: Arc<dyn BlobStore>, config: BlobConfig) -> Self {
        Self {
            store,
            keys: Arc::new(DefaultKeyStrategy),
            config,
        }
    }

    /// Store a blob from a stream under a freshly generated key below `prefix`
    pub async fn put(&self, prefix: &str, put: BlobPut, body: ByteStream) -> BlobResult<BlobReceipt> {
        let limit = self.config.max_blob_bytes;
        if let Some(size) = put.size_hint {
            if size > limit {
                return Err(BlobError::TooLarge { size, limit });
            }
        }

        let blob_id = BlobId::new();
        let key = self.keys.object_key(prefix, blob_id.as_str(), &put.key_hints);
        crate::validate_key(&key)?;

        let content_type = put
            .content_type
            .clone()
            .unwrap_or_else(|| self.config.fallback_content_type.clone());

        let overflow = Arc::new(AtomicBool::new(false));
        let body = limit_stream(body, limit, Arc::clone(&overflow));

        let result = match self
            .store
            .put(&key, Some(&content_type), &put.annotations, body)
            .await
        {
            Ok(result) => result,
            Err(_) if overflow.load(Ordering::SeqCst) => {
                return Err(BlobError::TooLarge {
                    size: limit + 1,
                    limit,
                })
            }
            Err(e) => return Err(e),
        };

        let mut receipt = BlobReceipt::new(blob_id, key.clone(), result.size_bytes)
            .with_url(self.store.url_for(&key))
            .with_content_type(content_type)
            .with_annotations(put.annotations);

        if let Some(filename) = put.filename {
            receipt = receipt.with_filename(filename);
        }
        if let Some(etag) = result.etag {
            receipt = receipt.with_etag(etag);
        }

        Ok(receipt)
    }

    /// Open a blob for reading
    pub async fn open(&self, key: &str) -> BlobResult<OpenedBlob> {
        crate::validate_key(key)?;
        let got = self.store.get(key).await?;
        Ok(OpenedBlob {
            key: key.to_string(),
            size_bytes: got.size_bytes,
            content_type: got.content_type,
            etag: got.etag,
            stream: got.stream,
        })
    }

    /// Delete a blob
    pub async fn delete(&self, key: &str) -> BlobResult<()> {
        crate::validate_key(key)?;
        self.store.delete(key).await
    }

    pub fn url_for(&self, key: &str) -> String {
        self.store.url_for(key)
    }

    pub async fn ping(&self) -> BlobResult<()> {
        self.store.ping().await
    }

    /// Get configuration
    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    pub fn capabilities(&self) -> StoreCapabilities {
        self.store.capabilities()
    }
}

/// Fail the stream once more than `limit` bytes have passed through it.
fn limit_stream(body: ByteStream, limit: u64, overflow: Arc<AtomicBool>) -> ByteStream {
    let mut seen: u64 = 0;
    Box::pin(body.map(move |chunk| {
        let chunk = chunk?;
        seen += chunk.len() as u64;
        if seen > limit {
            overflow.store(true, Ordering::SeqCst);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("blob exceeds {limit} bytes"),
            ));
        }
        Ok(chunk)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{collect_stream, stream_from_bytes, MemoryBlobStore};

    fn adapter(limit: u64) -> (BlobAdapter, Arc<MemoryBlobStore>) {
        let store = Arc::new(MemoryBlobStore::new("http://localhost/uploads"));
        let adapter = BlobAdapter::new(store.clone(), BlobConfig::new().with_max_blob_bytes(limit));
        (adapter, store)
    }

    #[tokio::test]
    async fn put_returns_receipt_with_url_and_size() {
        let (adapter, store) = adapter(1024);
        let put = BlobPut::new()
            .with_content_type("image/png")
            .with_filename("cat.png")
            .with_key_hint("extension", "png")
            .with_annotation("section", "drawings");

        let receipt = adapter.put("drawings", put, stream_from_bytes("pixels")).await.unwrap();

        assert!(receipt.key.starts_with("drawings/"));
        assert!(receipt.key.ends_with(".png"));
        assert_eq!(receipt.size_bytes, 6);
        assert_eq!(receipt.url, format!("http://localhost/uploads/{}", receipt.key));
        assert_eq!(receipt.filename.as_deref(), Some("cat.png"));
        assert!(store.contains(&receipt.key));
    }

    #[tokio::test]
    async fn size_hint_over_limit_never_reaches_store() {
        let (adapter, store) = adapter(4);
        let put = BlobPut::new().with_size_hint(5);

        let err = adapter.put("others", put, stream_from_bytes("12345")).await.unwrap_err();

        assert!(matches!(err, BlobError::TooLarge { size: 5, limit: 4 }));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn oversize_stream_without_hint_is_rejected() {
        let (adapter, store) = adapter(4);

        let err = adapter
            .put("others", BlobPut::new(), stream_from_bytes("123456"))
            .await
            .unwrap_err();

        assert!(matches!(err, BlobError::TooLarge { .. }));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn open_streams_stored_content() {
        let (adapter, _store) = adapter(1024);
        let receipt = adapter
            .put("others", BlobPut::new().with_content_type("image/gif"), stream_from_bytes("gif89a"))
            .await
            .unwrap();

        let opened = adapter.open(&receipt.key).await.unwrap();
        assert_eq!(opened.content_type.as_deref(), Some("image/gif"));
        assert_eq!(&collect_stream(opened.stream).await.unwrap()[..], b"gif89a");
    }

    #[tokio::test]
    async fn traversal_keys_are_refused() {
        let (adapter, _store) = adapter(1024);
        let err = adapter.delete("../outside").await.unwrap_err();
        assert!(err.is_client_error());
    }
}
