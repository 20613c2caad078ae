use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use gallery_blob::{BlobStore, FsBlobStore, MemoryBlobStore, S3CompatibleStore, S3Config};
use gallery_core::{FsMetadataStore, GalleryConfigSnapshot, MemoryMetadataStore, MetadataStore};

pub async fn open_blob_store(config: &GalleryConfigSnapshot) -> Result<Arc<dyn BlobStore>> {
    let backend = config.get_or("blob.backend", "fs").to_ascii_lowercase();
    let public_url = config.get_or("blob.public_url", "/uploads");

    let store: Arc<dyn BlobStore> = match backend.as_str() {
        "memory" => Arc::new(MemoryBlobStore::new(public_url)),
        "fs" => {
            let root = config.get_or("blob.root", "./uploads");
            Arc::new(FsBlobStore::new(&root, public_url).await?)
        }
        "s3" => Arc::new(S3CompatibleStore::connect(s3_config(config)?).await?),
        other => bail!("unknown blob.backend '{other}' (expected fs, memory or s3)"),
    };

    tracing::info!(%backend, "blob store ready");
    Ok(store)
}

fn s3_config(config: &GalleryConfigSnapshot) -> Result<S3Config> {
    let bucket = config
        .get_string("s3.bucket")
        .ok_or_else(|| anyhow!("s3.bucket is required when blob.backend is s3"))?;
    let region = config.get_or("s3.region", "us-east-1");

    let mut s3 = S3Config::new(bucket, region);
    match (config.get_string("s3.access_key_id"), config.get_string("s3.secret_access_key")) {
        (Some(key), Some(secret)) => s3 = s3.with_credentials(key, secret),
        (None, None) => {}
        _ => bail!("s3.access_key_id and s3.secret_access_key must be set together"),
    }
    if let Some(endpoint) = config.get_string("s3.endpoint") {
        s3 = s3.with_endpoint(endpoint);
    }
    if let Some(public_url) = config.get_string("s3.public_url") {
        s3 = s3.with_public_url(public_url);
    }
    Ok(s3)
}

pub async fn open_metadata_store(config: &GalleryConfigSnapshot) -> Result<Arc<dyn MetadataStore>> {
    let backend = config.get_or("metadata.backend", "fs").to_ascii_lowercase();

    let store: Arc<dyn MetadataStore> = match backend.as_str() {
        "memory" => Arc::new(MemoryMetadataStore::new()),
        "fs" => Arc::new(FsMetadataStore::new(config.get_or("metadata.root", "./data/items"))),
        other => bail!("unknown metadata.backend '{other}' (expected fs or memory)"),
    };
    store.open().await?;

    tracing::info!(%backend, "metadata store ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gallery_core::GalleryConfig;

    #[test]
    fn s3_requires_bucket_and_paired_credentials() {
        let mut config = GalleryConfig::new();
        config.set("blob.backend", "s3");
        assert!(s3_config(&config.snapshot()).is_err());

        config.set("s3.bucket", "art");
        config.set("s3.access_key_id", "id-only");
        assert!(s3_config(&config.snapshot()).is_err());

        config.set("s3.secret_access_key", "secret");
        config.set("s3.endpoint", "http://localhost:9000");
        let s3 = s3_config(&config.snapshot()).unwrap();
        assert_eq!(s3.bucket, "art");
        assert_eq!(s3.endpoint_url.as_deref(), Some("http://localhost:9000"));
    }

    #[tokio::test]
    async fn unknown_backends_are_rejected() {
        let mut config = GalleryConfig::new();
        config.set("blob.backend", "ftp");
        config.set("metadata.backend", "sql");
        let snap = config.snapshot();

        assert!(open_blob_store(&snap).await.is_err());
        assert!(open_metadata_store(&snap).await.is_err());
    }
}
