use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{
    collect_stream, stream_from_bytes, Annotations, BlobError, BlobResult, BlobStore, ByteStream,
    GetResult, ObjectHead, PutResult, StoreCapabilities,
};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    annotations: Annotations,
    etag: String,
    last_modified: i64,
}

/// In-process blob store. Used for tests and ephemeral deployments.
#[derive(Clone)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    base_url: String,
    fail_puts: Arc<AtomicBool>,
    fail_deletes: Arc<AtomicBool>,
    offline: Arc<AtomicBool>,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            base_url: base_url.into(),
            fail_puts: Arc::new(AtomicBool::new(false)),
            fail_deletes: Arc::new(AtomicBool::new(false)),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn annotations(&self, key: &str) -> Option<Annotations> {
        self.objects.read().get(key).map(|o| o.annotations.clone())
    }

    /// Test hook: make every subsequent put fail with a backend error.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Test hook: make every subsequent delete fail with a backend error.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Test hook: make `ping` report the store as unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn injected(reason: &str) -> BlobError {
        BlobError::backend(std::io::Error::new(std::io::ErrorKind::Other, reason.to_string()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        content_type: Option<&str>,
        annotations: &Annotations,
        stream: ByteStream,
    ) -> BlobResult<PutResult> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Self::injected("injected put failure"));
        }

        let data = collect_stream(stream).await?;
        let size_bytes = data.len() as u64;
        let etag = format!("\"{}\"", uuid::Uuid::new_v4().simple());

        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.map(str::to_string),
                annotations: annotations.clone(),
                etag: etag.clone(),
                last_modified: chrono::Utc::now().timestamp(),
            },
        );

        Ok(PutResult {
            etag: Some(etag),
            size_bytes,
        })
    }

    async fn get(&self, key: &str) -> BlobResult<GetResult> {
        let object = self
            .objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::not_found(key))?;

        Ok(GetResult {
            size_bytes: object.data.len() as u64,
            content_type: object.content_type,
            etag: Some(object.etag),
            stream: stream_from_bytes(object.data),
        })
    }

    async fn head(&self, key: &str) -> BlobResult<ObjectHead> {
        let objects = self.objects.read();
        let object = objects.get(key).ok_or_else(|| BlobError::not_found(key))?;
        Ok(ObjectHead {
            size_bytes: object.data.len() as u64,
            content_type: object.content_type.clone(),
            etag: Some(object.etag.clone()),
            last_modified: Some(object.last_modified),
            annotations: object.annotations.clone(),
        })
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::injected("injected delete failure"));
        }
        match self.objects.write().remove(key) {
            Some(_) => Ok(()),
            None => Err(BlobError::not_found(key)),
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    async fn ping(&self) -> BlobResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BlobError::unavailable("memory store marked offline"));
        }
        Ok(())
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::basic()
    }
}
