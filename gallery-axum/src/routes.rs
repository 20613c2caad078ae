//! The gallery route table.
//!
//! | method | path | handler |
//! |---|---|---|
//! | POST | `/upload` | ingest a multipart upload |
//! | GET | `/files/{section}` | list a section, newest first |
//! | GET | `/files/item/{id}` | one item by id |
//! | PUT | `/update/{id}` | update fields and/or swap the binary |
//! | DELETE | `/delete/{id}` | delete by id |
//! | DELETE | `/delete` | legacy delete by `{filename, section}` |
//! | GET | `/stats` | section statistics |
//! | GET | `/health` | store health |
//! | GET | `/uploads/{*key}` | stream a stored binary |
//! | GET | `/{section}/{slug}` | one item by slug |

use axum::{
    body::Body,
    extract::rejection::JsonRejection,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing, Json, Router,
};
use gallery_blob::content_type_for_key;
use gallery_core::{Deleted, ErrorKind, GalleryError, GalleryItem, GalleryResult, HealthReport, SectionStats};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::middlewares::UploadForm;
use crate::{ApiError, GalleryState};

pub fn router(state: GalleryState) -> Router<()> {
    Router::new()
        .route("/upload", routing::post(upload))
        .route("/files/{section}", routing::get(list_section))
        .route("/files/item/{id}", routing::get(get_item))
        .route("/update/{id}", routing::put(update_item))
        .route("/delete/{id}", routing::delete(delete_item))
        .route("/delete", routing::delete(delete_by_filename))
        .route("/stats", routing::get(stats))
        .route("/health", routing::get(health))
        .route("/uploads/{*key}", routing::get(serve_blob))
        .route("/{section}/{slug}", routing::get(find_by_slug))
        .with_state(state)
}

fn map_json_rejection(rejection: JsonRejection) -> ApiError {
    GalleryError::invalid_input("Failed to parse the request body as JSON")
        .with_data(json!({"_schema": [rejection.body_text()]}))
        .into()
}

async fn upload(
    State(state): State<GalleryState>,
    form: UploadForm,
) -> Result<(StatusCode, Json<GalleryItem>), ApiError> {
    let UploadForm { fields, file } = form;
    let file = file.ok_or_else(|| GalleryError::invalid_input("No file uploaded"))?;

    let item = state.assets.ingest(file.into_upload(), fields).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn list_section(
    State(state): State<GalleryState>,
    Path(section): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let files = state.assets.list_by_section(&section).await?;
    Ok(Json(json!({ "files": files })))
}

async fn get_item(
    State(state): State<GalleryState>,
    Path(id): Path<String>,
) -> Result<Json<GalleryItem>, ApiError> {
    Ok(Json(state.assets.get_by_id(&id).await?))
}

async fn find_by_slug(
    State(state): State<GalleryState>,
    Path((section, slug)): Path<(String, String)>,
) -> Result<Json<GalleryItem>, ApiError> {
    Ok(Json(state.assets.find_by_slug(&section, &slug).await?))
}

async fn update_item(
    State(state): State<GalleryState>,
    Path(id): Path<String>,
    form: UploadForm,
) -> Result<Json<GalleryItem>, ApiError> {
    let UploadForm { fields, file } = form;
    let item = state
        .assets
        .update(&id, fields, file.map(|f| f.into_upload()))
        .await?;
    Ok(Json(item))
}

async fn delete_item(
    State(state): State<GalleryState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    deletion_response(state.assets.delete(&id).await)
}

#[derive(Debug, Deserialize)]
struct LegacyDelete {
    filename: String,
    section: String,
}

async fn delete_by_filename(
    State(state): State<GalleryState>,
    body: Result<Json<LegacyDelete>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(target) = body.map_err(map_json_rejection)?;
    deletion_response(
        state
            .assets
            .delete_by_filename(&target.section, &target.filename)
            .await,
    )
}

/// A partial failure still removed the item, so it is reported as success with a warning.
fn deletion_response(result: GalleryResult<Deleted>) -> Result<Json<Value>, ApiError> {
    match result {
        Ok(deleted) => Ok(Json(json!({
            "message": "Item deleted successfully",
            "id": deleted.id,
        }))),
        Err(err) if err.is(ErrorKind::PartialFailure) => {
            let data = err.data.clone().unwrap_or(Value::Null);
            Ok(Json(json!({
                "message": "Item deleted successfully",
                "id": data["id"],
                "warning": err.message,
                "orphanedBlobKey": data["orphanedBlobKey"],
            })))
        }
        Err(err) => Err(err.into()),
    }
}

async fn stats(State(state): State<GalleryState>) -> Result<Json<SectionStats>, ApiError> {
    Ok(Json(state.assets.stats().await?))
}

async fn health(State(state): State<GalleryState>) -> Json<HealthReport> {
    Json(state.assets.health().await)
}

async fn serve_blob(
    State(state): State<GalleryState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let blob = state.assets.open_blob(&key).await?;
    let content_type = blob
        .content_type
        .clone()
        .or_else(|| content_type_for_key(&key))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, blob.size_bytes);
    if let Some(etag) = &blob.etag {
        builder = builder.header(header::ETAG, etag.as_str());
    }

    builder
        .body(Body::from_stream(blob.stream))
        .map_err(|e| ApiError(e.into()))
}
