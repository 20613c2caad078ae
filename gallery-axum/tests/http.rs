use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use gallery_axum::{gallery, GalleryApp};
use gallery_blob::{BlobAdapter, BlobConfig, MemoryBlobStore};
use gallery_core::{AssetManager, MemoryMetadataStore, MetadataStore};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

const BOUNDARY: &str = "XyZgalleryBoundary";

struct TestApp {
    app: GalleryApp,
    blobs: MemoryBlobStore,
    metadata: MemoryMetadataStore,
}

fn test_app() -> TestApp {
    test_app_with_limit(10 * 1024 * 1024)
}

fn test_app_with_limit(max_bytes: u64) -> TestApp {
    let blobs = MemoryBlobStore::new("http://localhost:3030/uploads");
    let metadata = MemoryMetadataStore::new();
    let adapter = BlobAdapter::new(
        Arc::new(blobs.clone()),
        BlobConfig::default().with_max_blob_bytes(max_bytes),
    );
    let assets = AssetManager::new(adapter, Arc::new(metadata.clone()));
    TestApp {
        app: gallery(assets),
        blobs,
        metadata,
    }
}

struct Part<'a> {
    name: &'a str,
    filename: Option<&'a str>,
    content_type: Option<&'a str>,
    data: &'a [u8],
}

fn text(name: &'static str, value: &'static str) -> Part<'static> {
    Part {
        name,
        filename: None,
        content_type: None,
        data: value.as_bytes(),
    }
}

fn file<'a>(filename: &'a str, content_type: &'a str, data: &'a [u8]) -> Part<'a> {
    Part {
        name: "file",
        filename: Some(filename),
        content_type: Some(content_type),
        data,
    }
}

fn multipart(method: &str, uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
        if let Some(f) = part.filename {
            disposition.push_str(&format!("; filename=\"{f}\""));
        }
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        if let Some(ct) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn with_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &GalleryApp, req: Request<Body>) -> (u16, Value) {
    let res = app.router.clone().oneshot(req).await.unwrap();
    let status = res.status().as_u16();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn upload_painting(app: &GalleryApp, title: &'static str, filename: &str) -> Value {
    let req = multipart(
        "POST",
        "/upload",
        &[
            text("section", "paintings"),
            text("title", title),
            text("materials", "Oil on canvas"),
            text("paintingSize", "50x70"),
            file(filename, "image/jpeg", b"\xff\xd8\xff\xe0jpeg-bytes"),
        ],
    );
    let (status, body) = send(app, req).await;
    assert_eq!(status, 201, "upload failed: {body}");
    body
}

#[tokio::test]
async fn upload_then_fetch_by_id_and_slug() {
    let t = test_app();
    let item = upload_painting(&t.app, "Sunset", "sunset.jpg").await;

    assert_eq!(item["section"], "paintings");
    assert_eq!(item["materials"], "Oil on canvas");
    assert_eq!(item["dimensions"], "50x70");
    assert_eq!(item["slug"], "sunset-sunset");
    assert!(item["url"].as_str().unwrap().ends_with(".jpg"));

    let id = item["id"].as_str().unwrap();
    let (status, fetched) = send(&t.app, get(&format!("/files/item/{id}"))).await;
    assert_eq!(status, 200);
    assert_eq!(fetched["blobKey"], item["blobKey"]);

    let (status, by_slug) = send(&t.app, get("/paintings/sunset-sunset")).await;
    assert_eq!(status, 200);
    assert_eq!(by_slug["id"], item["id"]);
}

#[tokio::test]
async fn same_title_paintings_coexist() {
    let t = test_app();
    let a = upload_painting(&t.app, "Sunset", "first.jpg").await;
    let b = upload_painting(&t.app, "Sunset", "second.jpg").await;
    assert_ne!(a["slug"], b["slug"]);

    let (status, listing) = send(&t.app, get("/files/paintings")).await;
    assert_eq!(status, 200);
    assert_eq!(listing["files"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn non_image_upload_is_bad_request() {
    let t = test_app();
    let req = multipart(
        "POST",
        "/upload",
        &[text("section", "drawings"), file("notes.txt", "text/plain", b"hello")],
    );
    let (status, body) = send(&t.app, req).await;

    assert_eq!(status, 400);
    assert_eq!(body["name"], "BadRequest");
    assert_eq!(body["className"], "bad-request");
    assert!(t.blobs.is_empty());
}

#[tokio::test]
async fn upload_without_file_is_bad_request() {
    let t = test_app();
    let req = multipart("POST", "/upload", &[text("title", "Nothing")]);
    let (status, _) = send(&t.app, req).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn oversize_upload_creates_nothing() {
    let t = test_app_with_limit(32);
    let big = vec![0xffu8; 64];
    let req = multipart("POST", "/upload", &[file("big.jpg", "image/jpeg", &big)]);
    let (status, body) = send(&t.app, req).await;

    assert_eq!(status, 400);
    assert_eq!(body["code"], 400);
    assert!(t.blobs.is_empty());
    assert!(t.metadata.is_empty());
}

#[tokio::test]
async fn missing_and_malformed_ids() {
    let t = test_app();
    let (status, body) = send(&t.app, get("/files/item/not-a-uuid")).await;
    assert_eq!(status, 400);
    assert_eq!(body["name"], "BadRequest");

    let (status, body) = send(&t.app, get("/files/item/67e55044-10b1-426f-9247-bb680e5fe0c8")).await;
    assert_eq!(status, 404);
    assert_eq!(body["className"], "not-found");

    let (status, _) = send(&t.app, get("/paintings/nothing-here")).await;
    assert_eq!(status, 404);

    let (status, listing) = send(&t.app, get("/files/empty-section")).await;
    assert_eq!(status, 200);
    assert_eq!(listing, json!({ "files": [] }));
}

#[tokio::test]
async fn update_with_json_fields() {
    let t = test_app();
    let item = upload_painting(&t.app, "Before", "a.jpg").await;
    let id = item["id"].as_str().unwrap();

    let (status, updated) = send(
        &t.app,
        with_json("PUT", &format!("/update/{id}"), json!({ "title": "After" })),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(updated["title"], "After");
    assert_eq!(updated["materials"], "Oil on canvas");
    assert_eq!(updated["blobKey"], item["blobKey"]);

    let (status, _) = send(&t.app, with_json("PUT", &format!("/update/{id}"), json!({}))).await;
    assert_eq!(status, 400);

    let (status, _) = send(
        &t.app,
        with_json("PUT", "/update/67e55044-10b1-426f-9247-bb680e5fe0c8", json!({ "title": "x" })),
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn update_with_new_binary_swaps_blobs() {
    let t = test_app();
    let item = upload_painting(&t.app, "Swap", "a.jpg").await;
    let id = item["id"].as_str().unwrap();
    let old_key = item["blobKey"].as_str().unwrap().to_string();

    let req = multipart(
        "PUT",
        &format!("/update/{id}"),
        &[file("b.png", "image/png", b"\x89PNG\r\n")],
    );
    let (status, updated) = send(&t.app, req).await;
    assert_eq!(status, 200);

    let new_key = updated["blobKey"].as_str().unwrap();
    assert_ne!(new_key, old_key);
    assert!(!t.blobs.contains(&old_key));
    assert!(t.blobs.contains(new_key));
}

#[tokio::test]
async fn delete_then_delete_again() {
    let t = test_app();
    let item = upload_painting(&t.app, "Gone", "gone.jpg").await;
    let id = item["id"].as_str().unwrap();

    let delete = |uri: String| Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap();

    let (status, body) = send(&t.app, delete(format!("/delete/{id}"))).await;
    assert_eq!(status, 200);
    assert_eq!(body["id"], item["id"]);
    assert!(body.get("warning").is_none());
    assert!(t.blobs.is_empty());

    let (status, _) = send(&t.app, delete(format!("/delete/{id}"))).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn partial_delete_reports_orphan_with_200() {
    let t = test_app();
    let item = upload_painting(&t.app, "Stuck", "stuck.jpg").await;
    let id = item["id"].as_str().unwrap();
    t.blobs.set_fail_deletes(true);

    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/delete/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&t.app, req).await;

    assert_eq!(status, 200);
    assert_eq!(body["orphanedBlobKey"], item["blobKey"]);
    assert!(body["warning"].is_string());
    assert!(t.metadata.is_empty());
}

#[tokio::test]
async fn legacy_delete_by_filename() {
    let t = test_app();
    upload_painting(&t.app, "Legacy", "legacy.jpg").await;

    let (status, _) = send(
        &t.app,
        with_json("DELETE", "/delete", json!({ "filename": "legacy.jpg", "section": "paintings" })),
    )
    .await;
    assert_eq!(status, 200);
    assert!(t.metadata.is_empty());

    let (status, body) = send(&t.app, with_json("DELETE", "/delete", json!({ "filename": "x.jpg" }))).await;
    assert_eq!(status, 400);
    assert_eq!(body["name"], "BadRequest");
}

#[tokio::test]
async fn stats_and_health() {
    let t = test_app();
    upload_painting(&t.app, "One", "one.jpg").await;
    upload_painting(&t.app, "Two", "two.jpg").await;

    let (status, stats) = send(&t.app, get("/stats")).await;
    assert_eq!(status, 200);
    assert_eq!(stats["sections"]["paintings"], 2);
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["recentUploads"], 2);
    assert_eq!(stats["monthlyUploads"], 2);

    let (status, health) = send(&t.app, get("/health")).await;
    assert_eq!(status, 200);
    assert_eq!(health, json!({ "status": "ok", "blobStore": "up", "metadataStore": "up" }));

    t.blobs.set_offline(true);
    let (_, health) = send(&t.app, get("/health")).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["blobStore"], "down");
}

#[tokio::test]
async fn uploads_route_streams_blob() {
    let t = test_app();
    let item = upload_painting(&t.app, "Stream", "stream.jpg").await;
    let key = item["blobKey"].as_str().unwrap();

    let res = t.app.router.clone().oneshot(get(&format!("/uploads/{key}"))).await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(res.headers().get("content-type").unwrap(), "image/jpeg");
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"\xff\xd8\xff\xe0jpeg-bytes");

    let (status, _) = send(&t.app, get("/uploads/paintings/2020/01/missing.jpg")).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn store_failures_are_sanitized() {
    let t = test_app();
    t.metadata.set_fail_creates(true);
    let req = multipart("POST", "/upload", &[file("a.jpg", "image/jpeg", b"\xff\xd8")]);
    let (status, body) = send(&t.app, req).await;

    assert_eq!(status, 500);
    assert_eq!(body["name"], "StoreFailure");
    assert_eq!(body["data"]["store"], "metadata");
    assert!(!body["message"].as_str().unwrap().contains("injected"));
    assert!(t.blobs.is_empty());
}

#[tokio::test]
async fn request_id_is_generated_and_preserved() {
    let t = test_app();
    let res = t.app.router.clone().oneshot(get("/health")).await.unwrap();
    assert!(res.headers().get("x-request-id").is_some());

    let provided = HeaderValue::from_static("req-test-123");
    let res = t
        .app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/stats")
                .header("x-request-id", provided.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.headers().get("x-request-id").unwrap(), &provided);
}

#[tokio::test]
async fn shutdown_closes_the_metadata_store() {
    let t = test_app();
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(t.app.listen_until("127.0.0.1:0", async move {
        let _ = stopped.await;
    }));

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
    assert!(t.metadata.ping().await.is_err());
}
