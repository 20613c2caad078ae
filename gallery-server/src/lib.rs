mod app;
mod stores;

use anyhow::Result;
use gallery_axum::GalleryApp;
use gallery_blob::{BlobAdapter, BlobConfig};
use gallery_core::{AssetManager, AssetSettings, GalleryConfig};

pub use app::{listen_addr, with_defaults};

/// Open the configured stores and build the router.
pub async fn build(config: GalleryConfig) -> Result<GalleryApp> {
    let config = with_defaults(config).snapshot();

    let max_bytes = app::number(&config, "upload.max_bytes", gallery_blob::DEFAULT_MAX_BLOB_BYTES)?;
    let settings = AssetSettings {
        recent_window_days: app::window_days(&config, "stats.recent_days", 7)?,
        monthly_window_days: app::window_days(&config, "stats.monthly_days", 30)?,
    };

    let blobs = BlobAdapter::new(
        stores::open_blob_store(&config).await?,
        BlobConfig::new().with_max_blob_bytes(max_bytes),
    );
    if !blobs.capabilities().durable {
        tracing::warn!("blob store is not durable; uploads are lost on restart");
    }
    let metadata = stores::open_metadata_store(&config).await?;

    let assets = AssetManager::new(blobs, metadata).with_settings(settings);
    Ok(GalleryApp::new(assets))
}
