use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gallery_core::errors::GalleryError;

#[derive(Debug)]
pub struct ApiError(pub anyhow::Error);

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<GalleryError> for ApiError {
    fn from(e: GalleryError) -> Self {
        Self(e.into_anyhow())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // If it's a GalleryError (even if wrapped by anyhow contexts), preserve Feathers-ish fields
        if let Some(gallery) = self.0.chain().find_map(|e| e.downcast_ref::<GalleryError>()) {
            if gallery.code() >= 500 {
                tracing::error!(error = ?gallery, "request failed");
            }
            let safe = gallery.sanitize_for_client();
            let status = StatusCode::from_u16(safe.code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, Json(safe.to_json())).into_response();
        }

        // Fallback: wrap any non-GalleryError as a GalleryError::GeneralError
        tracing::error!(error = ?self.0, "unclassified request failure");
        let gallery = GalleryError::normalize(self.0);
        let safe = gallery.sanitize_for_client();
        let status = StatusCode::from_u16(safe.code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(safe.to_json())).into_response()
    }
}
