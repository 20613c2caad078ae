use async_trait::async_trait;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::{
    content_type_for_key, validate_key, Annotations, BlobError, BlobResult, BlobStore, ByteStream, GetResult, ObjectHead,
    PutResult, StoreCapabilities,
};

const TMP_DIR: &str = ".tmp";

/// Local-disk blob store.
///
/// Blobs live at `{root}/{key}`; writes go through `{root}/.tmp` and are renamed into place,
/// so readers never observe a partially written blob. Content types are derived from the
/// key's extension and annotations are not persisted.
pub struct FsBlobStore {
    root: PathBuf,
    base_url: String,
}

impl FsBlobStore {
    /// Create the store, making sure the root and staging directories exist.
    pub async fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> BlobResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(TMP_DIR)).await?;
        Ok(Self {
            root,
            base_url: base_url.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &str) -> BlobResult<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, segment| path.join(segment)))
    }

    fn temp_path(&self) -> PathBuf {
        self.root
            .join(TMP_DIR)
            .join(uuid::Uuid::new_v4().to_string())
    }

    async fn write_temp(&self, temp_path: &Path, mut stream: ByteStream) -> BlobResult<u64> {
        let mut file = fs::File::create(temp_path).await?;
        let mut total: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            total += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(total)
    }
}

fn not_found_or_io(key: &str) -> impl FnOnce(std::io::Error) -> BlobError + '_ {
    move |e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BlobError::not_found(key)
        } else {
            e.into()
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        key: &str,
        _content_type: Option<&str>,
        _annotations: &Annotations,
        stream: ByteStream,
    ) -> BlobResult<PutResult> {
        let blob_path = self.blob_path(key)?;
        let temp_path = self.temp_path();

        let size_bytes = match self.write_temp(&temp_path, stream).await {
            Ok(size) => size,
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = fs::rename(&temp_path, &blob_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        tracing::debug!(key, size_bytes, "blob written to disk");
        Ok(PutResult {
            etag: None,
            size_bytes,
        })
    }

    async fn get(&self, key: &str) -> BlobResult<GetResult> {
        let path = self.blob_path(key)?;
        let file = fs::File::open(&path).await.map_err(not_found_or_io(key))?;
        let size_bytes = file.metadata().await?.len();

        Ok(GetResult {
            stream: Box::pin(ReaderStream::new(file)),
            size_bytes,
            content_type: content_type_for_key(key),
            etag: None,
        })
    }

    async fn head(&self, key: &str) -> BlobResult<ObjectHead> {
        let path = self.blob_path(key)?;
        let meta = fs::metadata(&path).await.map_err(not_found_or_io(key))?;
        let last_modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);

        Ok(ObjectHead {
            size_bytes: meta.len(),
            content_type: content_type_for_key(key),
            etag: None,
            last_modified,
            annotations: Annotations::new(),
        })
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        let path = self.blob_path(key)?;
        fs::remove_file(&path).await.map_err(not_found_or_io(key))
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    async fn ping(&self) -> BlobResult<()> {
        let meta = fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(BlobError::unavailable(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::basic().durable()
    }
}
