use std::sync::Arc;

use gallery_core::AssetManager;

use crate::middlewares::MultipartConfig;

/// Router state shared by every handler.
#[derive(Clone)]
pub struct GalleryState {
    pub assets: Arc<AssetManager>,
    pub multipart: Arc<MultipartConfig>,
}

impl GalleryState {
    pub fn new(assets: Arc<AssetManager>, multipart: MultipartConfig) -> Self {
        Self {
            assets,
            multipart: Arc::new(multipart),
        }
    }
}
