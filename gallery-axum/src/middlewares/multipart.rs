use std::collections::HashSet;

use axum::{
    body::Body,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
};
use base64::Engine;
use bytes::Bytes;
use gallery_blob::content_type_for_key;
use gallery_core::{GalleryError, GalleryResult, ItemFields, Upload};
use serde_json::json;

use crate::{ApiError, GalleryState};

/// Limits and field names for upload forms.
#[derive(Debug, Clone)]
pub struct MultipartConfig {
    /// Maximum size of the binary part in bytes
    pub max_file_size: usize,
    /// Maximum size of the whole request body in bytes
    pub max_total_size: usize,
    /// Field names treated as the binary part; any part with a filename also qualifies
    pub file_fields: HashSet<String>,
}

/// Headroom for text fields on top of the binary.
const FORM_FIELD_ALLOWANCE: usize = 1024 * 1024;

impl Default for MultipartConfig {
    fn default() -> Self {
        Self::for_payload_limit(gallery_blob::DEFAULT_MAX_BLOB_BYTES)
    }
}

impl MultipartConfig {
    /// Binary capped at `max_bytes`, whole body at `max_bytes` + 1 MiB.
    pub fn for_payload_limit(max_bytes: u64) -> Self {
        let max_file_size = usize::try_from(max_bytes).unwrap_or(usize::MAX);
        Self {
            max_file_size,
            max_total_size: max_file_size.saturating_add(FORM_FIELD_ALLOWANCE),
            file_fields: HashSet::from(["file".to_string()]),
        }
    }
}

/// The binary part of an upload form.
#[derive(Debug, Clone)]
pub struct FormFile {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

impl FormFile {
    pub fn into_upload(self) -> Upload {
        Upload::new(self.data, self.content_type, self.filename)
    }
}

/// An upload or update form: descriptive fields plus an optional binary.
///
/// Accepts `multipart/form-data` or a JSON object of string fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub fields: ItemFields,
    pub file: Option<FormFile>,
}

impl FromRequest<GalleryState> for UploadForm {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &GalleryState) -> Result<Self, Self::Rejection> {
        Ok(read_form(req, &state.multipart).await?)
    }
}

async fn read_form(req: Request<Body>, config: &MultipartConfig) -> GalleryResult<UploadForm> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = axum::body::to_bytes(req.into_body(), config.max_total_size)
        .await
        .map_err(|_| {
            GalleryError::invalid_input(format!(
                "Request body exceeds the {} byte limit",
                config.max_total_size
            ))
            .with_data(json!({ "limit": config.max_total_size }))
        })?;

    let mime = content_type.to_ascii_lowercase();
    if mime.starts_with("multipart/form-data") {
        parse_multipart(&content_type, body, config).await
    } else if mime.starts_with("application/json") || (mime.is_empty() && !body.is_empty()) {
        let fields: ItemFields = serde_json::from_slice(&body).map_err(|e| {
            GalleryError::invalid_input("Failed to parse the request body as JSON")
                .with_data(json!({ "_schema": [e.to_string()] }))
        })?;
        Ok(UploadForm { fields, file: None })
    } else if body.is_empty() {
        Ok(UploadForm::default())
    } else {
        Err(GalleryError::invalid_input(format!(
            "Unsupported request content type '{content_type}'"
        )))
    }
}

async fn parse_multipart(content_type: &str, body: Bytes, config: &MultipartConfig) -> GalleryResult<UploadForm> {
    let boundary = multer::parse_boundary(content_type)
        .map_err(|_| GalleryError::invalid_input("Missing boundary in multipart content-type"))?;

    let mut multipart = multer::Multipart::new(
        futures::stream::once(async move { Ok::<Bytes, multer::Error>(body) }),
        boundary,
    );

    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or("").to_string();
        let filename = field.file_name().map(decode_encoded_word);

        if config.file_fields.contains(&name) || filename.is_some() {
            let declared = field.content_type().map(|m| m.essence_str().to_string());
            let data = field.bytes().await.map_err(malformed)?;
            if form.file.is_some() {
                // First binary part wins
                continue;
            }
            if data.len() > config.max_file_size {
                return Err(GalleryError::invalid_input(format!(
                    "File of {} bytes exceeds the {} byte limit",
                    data.len(),
                    config.max_file_size
                ))
                .with_data(json!({ "limit": config.max_file_size })));
            }

            let filename = filename.unwrap_or_default();
            let content_type = match declared {
                Some(ct) if ct != "application/octet-stream" => ct,
                _ => content_type_for_key(&filename).unwrap_or_else(|| "application/octet-stream".to_string()),
            };
            tracing::debug!(field = %name, %filename, %content_type, size = data.len(), "form file received");
            form.file = Some(FormFile {
                filename,
                content_type,
                data,
            });
            continue;
        }

        let value = field.text().await.map_err(malformed)?;
        let slot = match name.as_str() {
            "section" => &mut form.fields.section,
            "title" => &mut form.fields.title,
            "description" => &mut form.fields.description,
            "materials" => &mut form.fields.materials,
            "paintingSize" | "dimensions" => &mut form.fields.dimensions,
            _ => continue,
        };
        *slot = Some(value);
    }

    Ok(form)
}

fn malformed(err: multer::Error) -> GalleryError {
    GalleryError::invalid_input(format!("Failed to parse multipart data: {err}"))
}

/// Decode RFC 2047 encoded words like `=?UTF-8?B?base64data?=`; anything else is returned as is.
pub fn decode_encoded_word(input: &str) -> String {
    if !input.starts_with("=?") || !input.ends_with("?=") {
        return input.to_string();
    }

    if let Some(decoded) = decode_segment(input) {
        return decoded;
    }

    // Multiple encoded segments separated by whitespace
    let decoded_parts: Vec<String> = input.split_whitespace().filter_map(decode_segment).collect();
    if decoded_parts.is_empty() {
        input.to_string()
    } else {
        decoded_parts.join("")
    }
}

fn decode_segment(segment: &str) -> Option<String> {
    let content = segment
        .strip_prefix("=?UTF-8?B?")
        .or_else(|| segment.strip_prefix("=?utf-8?B?"))?
        .strip_suffix("?=")?;
    let decoded_bytes = base64::engine::general_purpose::STANDARD.decode(content).ok()?;
    String::from_utf8(decoded_bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gallery_core::ErrorKind;

    const BOUNDARY: &str = "gallery-test-boundary";

    fn multipart_body(parts: &[(&str, Option<&str>, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, content_type, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match filename {
                Some(f) => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n").as_bytes(),
                ),
                None => body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n").as_bytes()),
            }
            if let Some(ct) = content_type {
                body.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
            }
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn request(content_type: &str, body: Vec<u8>) -> Request<Body> {
        axum::http::Request::builder()
            .method("POST")
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn multipart_fields_and_file_are_split() {
        let body = multipart_body(&[
            ("section", None, None, b"paintings"),
            ("title", None, None, b"Sunset"),
            ("paintingSize", None, None, b"50x70"),
            ("ignored", None, None, b"x"),
            ("file", Some("sunset.jpg"), Some("image/jpeg"), b"\xff\xd8\xff"),
        ]);
        let req = request(&format!("multipart/form-data; boundary={BOUNDARY}"), body);

        let form = read_form(req, &MultipartConfig::default()).await.unwrap();

        assert_eq!(form.fields.section.as_deref(), Some("paintings"));
        assert_eq!(form.fields.title.as_deref(), Some("Sunset"));
        assert_eq!(form.fields.dimensions.as_deref(), Some("50x70"));
        let file = form.file.unwrap();
        assert_eq!(file.filename, "sunset.jpg");
        assert_eq!(file.content_type, "image/jpeg");
        assert_eq!(&file.data[..], b"\xff\xd8\xff");
    }

    #[tokio::test]
    async fn missing_part_content_type_is_guessed_from_name() {
        let body = multipart_body(&[("image", Some("moon.png"), None, b"\x89PNG")]);
        let req = request(&format!("multipart/form-data; boundary={BOUNDARY}"), body);

        let form = read_form(req, &MultipartConfig::default()).await.unwrap();
        assert_eq!(form.file.unwrap().content_type, "image/png");

        let body = multipart_body(&[("file", Some("scan.jp2"), Some("application/octet-stream"), b"\0\0\0\x0cjP")]);
        let req = request(&format!("multipart/form-data; boundary={BOUNDARY}"), body);

        let form = read_form(req, &MultipartConfig::default()).await.unwrap();
        assert_eq!(form.file.unwrap().content_type, "image/jp2");
    }

    #[tokio::test]
    async fn oversized_file_part_is_rejected() {
        let big = vec![7u8; 64];
        let body = multipart_body(&[("file", Some("big.jpg"), Some("image/jpeg"), &big)]);
        let req = request(&format!("multipart/form-data; boundary={BOUNDARY}"), body);

        let config = MultipartConfig {
            max_file_size: 16,
            ..MultipartConfig::default()
        };
        let err = read_form(req, &config).await.unwrap_err();
        assert!(err.is(ErrorKind::InvalidInput));
    }

    #[tokio::test]
    async fn json_objects_are_accepted_for_fields() {
        let req = request("application/json", br#"{"title":"New","paintingSize":"1x1"}"#.to_vec());
        let form = read_form(req, &MultipartConfig::default()).await.unwrap();

        assert_eq!(form.fields.title.as_deref(), Some("New"));
        assert_eq!(form.fields.dimensions.as_deref(), Some("1x1"));
        assert!(form.file.is_none());

        let bad = request("application/json", b"{\"title\":".to_vec());
        assert!(read_form(bad, &MultipartConfig::default()).await.is_err());
    }

    #[test]
    fn encoded_filenames_are_decoded() {
        assert_eq!(decode_encoded_word("=?UTF-8?B?Q2Fmw6kuanBn?="), "Café.jpg");
        assert_eq!(decode_encoded_word("=?UTF-8?B?SGVsbG8=?= =?UTF-8?B?IFdvcmxk?="), "Hello World");
        assert_eq!(decode_encoded_word("plain.jpg"), "plain.jpg");
    }
}
