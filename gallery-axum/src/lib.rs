//! gallery-axum: Axum adapter for the gallery asset service.
//!
//! Builds the HTTP router on top of an [`gallery_core::AssetManager`]: multipart and JSON
//! form extraction, Feathers-style error responses, request ids and tracing.

pub mod app;
pub mod middlewares;
pub mod routes;
pub mod state;
mod error;
pub use error::ApiError;
pub use state::GalleryState;

pub use app::{gallery, GalleryApp};
