//! The asset manager keeps every gallery item's binary and metadata in step.
//!
//! Ordering rules, all of which exist so that a failure never leaves a record
//! pointing at a missing blob:
//! - ingest: blob first, then record; a failed record write deletes the new blob
//! - update with a new binary: new blob, then record, then old blob
//! - delete: record first, then blob; a failed blob delete is a partial failure

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use gallery_blob::{stream_from_bytes, BlobAdapter, BlobPut, BlobReceipt, OpenedBlob, HINT_EXTENSION};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::{GalleryError, GalleryResult};
use crate::item::{
    Deleted, GalleryItem, ItemFields, ItemId, ItemPatch, ItemRecord, NewItem, SectionStats, Upload,
    DEFAULT_SECTION, PAINTINGS,
};
use crate::metadata::{ItemField, ItemFilter, MetadataStore};
use crate::slug::slug_for;
use crate::bail_gallery;

/// Section names that would shadow fixed routes of the HTTP surface.
pub const RESERVED_SECTIONS: &[&str] = &["delete", "files", "health", "stats", "update", "upload", "uploads"];

const MAX_SECTION_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct AssetSettings {
    pub recent_window_days: i64,
    pub monthly_window_days: i64,
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            recent_window_days: 7,
            monthly_window_days: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub blob_store: ComponentStatus,
    pub metadata_store: ComponentStatus,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.blob_store == ComponentStatus::Up && self.metadata_store == ComponentStatus::Up
    }
}

/// Stateless between calls; share it behind an `Arc`.
pub struct AssetManager {
    blobs: BlobAdapter,
    metadata: Arc<dyn MetadataStore>,
    settings: AssetSettings,
}

impl AssetManager {
    pub fn new(blobs: BlobAdapter, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            blobs,
            metadata,
            settings: AssetSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: AssetSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn max_payload_bytes(&self) -> u64 {
        self.blobs.config().max_blob_bytes
    }

    /// Store a new image and its record.
    #[instrument(skip(self, upload, fields), fields(name = %upload.original_name, size = upload.len()))]
    pub async fn ingest(&self, upload: Upload, fields: ItemFields) -> GalleryResult<GalleryItem> {
        let upload = upload.normalized();
        self.validate_payload(&upload)?;
        let section = match fields.section.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_SECTION.to_string(),
            Some(raw) => normalize_section(raw)?,
        };
        ensure_writable_section(&section)?;

        let original_name = clean_original_name(&upload.original_name);
        let (materials, dimensions) = if section == PAINTINGS {
            (trimmed(fields.materials), trimmed(fields.dimensions))
        } else {
            (String::new(), String::new())
        };

        let receipt = self.store_blob(&section, &original_name, &upload).await?;

        let new_item = NewItem {
            section,
            blob_key: receipt.key.clone(),
            original_name,
            title: trimmed(fields.title),
            description: trimmed(fields.description),
            materials,
            dimensions,
            upload_date: Utc::now(),
            content_type: upload.content_type.clone(),
            size_bytes: receipt.size_bytes,
        };

        match self.metadata.create(new_item.clone()).await {
            Ok(id) => {
                let record = new_item.into_record(id);
                info!(id = %record.id, section = %record.section, key = %record.blob_key, "item ingested");
                Ok(self.present(record))
            }
            Err(err) => {
                warn!(key = %receipt.key, error = %err, "record write failed after blob upload");
                self.discard_blob(&receipt.key).await;
                Err(err.into())
            }
        }
    }

    /// Items of `section`, newest first.
    #[instrument(skip(self))]
    pub async fn list_by_section(&self, section: &str) -> GalleryResult<Vec<GalleryItem>> {
        // Reads never validate: a section that cannot exist is simply empty.
        let section = section.trim().to_ascii_lowercase();
        let mut records = self.metadata.find_by_section(&section).await?;
        records.sort_by(|a, b| b.upload_date.cmp(&a.upload_date).then_with(|| a.id.cmp(&b.id)));
        debug!(count = records.len(), "listed section");
        Ok(records.into_iter().map(|r| self.present(r)).collect())
    }

    pub async fn get_by_id(&self, raw_id: &str) -> GalleryResult<GalleryItem> {
        let id = self.metadata.parse_id(raw_id)?;
        let record = self.require(&id).await?;
        Ok(self.present(record))
    }

    /// First item of `section` whose derived slug equals `slug`.
    ///
    /// Linear in the section size; slugs are not indexed.
    #[instrument(skip(self))]
    pub async fn find_by_slug(&self, section: &str, slug: &str) -> GalleryResult<GalleryItem> {
        let wanted = slug.trim().to_ascii_lowercase();
        self.list_by_section(section)
            .await?
            .into_iter()
            .find(|item| item.slug == wanted)
            .ok_or_else(|| GalleryError::not_found(format!("No item '{slug}' in section '{section}'")))
    }

    /// Apply a partial update and optionally swap the binary.
    #[instrument(skip(self, fields, replacement), fields(replacing = replacement.is_some()))]
    pub async fn update(
        &self,
        raw_id: &str,
        fields: ItemFields,
        replacement: Option<Upload>,
    ) -> GalleryResult<GalleryItem> {
        let id = self.metadata.parse_id(raw_id)?;
        if fields.is_empty() && replacement.is_none() {
            bail_gallery!(invalid_input, "Nothing to update: supply at least one field or a new file");
        }
        let replacement = replacement.map(Upload::normalized);
        if let Some(upload) = &replacement {
            self.validate_payload(upload)?;
        }
        // A blank section in an update form means "leave it as is".
        let new_section = match fields.section.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => {
                let section = normalize_section(raw)?;
                ensure_writable_section(&section)?;
                Some(section)
            }
            None => None,
        };

        let current = self.require(&id).await?;
        let target_section = new_section.clone().unwrap_or_else(|| current.section.clone());

        let mut patch = ItemPatch {
            section: new_section,
            title: fields.title.map(|v| v.trim().to_string()),
            description: fields.description.map(|v| v.trim().to_string()),
            materials: fields.materials.map(|v| v.trim().to_string()),
            dimensions: fields.dimensions.map(|v| v.trim().to_string()),
            ..Default::default()
        };
        if target_section != PAINTINGS {
            patch.materials = Some(String::new());
            patch.dimensions = Some(String::new());
        }

        let mut staged: Option<BlobReceipt> = None;
        if let Some(upload) = &replacement {
            // originalName is immutable; the new key takes the replacement's extension.
            let receipt = self
                .store_blob(&target_section, &clean_original_name(&upload.original_name), upload)
                .await?;
            patch.blob_key = Some(receipt.key.clone());
            patch.content_type = Some(upload.content_type.clone());
            patch.size_bytes = Some(receipt.size_bytes);
            staged = Some(receipt);
        }

        let updated = match self.metadata.update(&id, &patch).await {
            Ok(record) => record,
            Err(err) => {
                if let Some(receipt) = &staged {
                    warn!(%id, key = %receipt.key, error = %err, "record update failed; removing replacement blob");
                    self.discard_blob(&receipt.key).await;
                }
                return Err(err.into());
            }
        };

        if staged.is_some() && current.blob_key != updated.blob_key {
            match self.blobs.delete(&current.blob_key).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(%id, orphaned_key = %current.blob_key, error = %e, "previous blob could not be removed");
                }
            }
        }

        info!(%id, "item updated");
        Ok(self.present(updated))
    }

    /// Remove an item: record first, then its blob.
    #[instrument(skip(self))]
    pub async fn delete(&self, raw_id: &str) -> GalleryResult<Deleted> {
        let id = self.metadata.parse_id(raw_id)?;
        let record = self.require(&id).await?;
        self.remove(record).await
    }

    /// Legacy removal by `(section, filename)`; `filename` may be the original
    /// name or the last segment of the blob key.
    #[instrument(skip(self))]
    pub async fn delete_by_filename(&self, section: &str, filename: &str) -> GalleryResult<Deleted> {
        let filename = filename.trim();
        if filename.is_empty() {
            bail_gallery!(invalid_input, "filename is required");
        }
        let section = section.trim().to_ascii_lowercase();
        let mut records = self.metadata.find_by_section(&section).await?;
        records.sort_by(|a, b| b.upload_date.cmp(&a.upload_date));

        let suffix = format!("/{filename}");
        let record = records
            .into_iter()
            .find(|r| r.original_name == filename || r.blob_key.ends_with(&suffix))
            .ok_or_else(|| GalleryError::not_found(format!("No file '{filename}' in section '{section}'")))?;
        self.remove(record).await
    }

    pub async fn stats(&self) -> GalleryResult<SectionStats> {
        let now = Utc::now();
        let mut sections = self.metadata.count_grouped_by(ItemField::Section).await?;
        sections.retain(|_, count| *count > 0);

        let total = self.metadata.count_where(&ItemFilter::all()).await?;
        let recent_uploads = self
            .metadata
            .count_where(&window_filter(now, self.settings.recent_window_days))
            .await?;
        let monthly_uploads = self
            .metadata
            .count_where(&window_filter(now, self.settings.monthly_window_days))
            .await?;

        Ok(SectionStats {
            sections,
            total,
            recent_uploads,
            monthly_uploads,
        })
    }

    pub async fn health(&self) -> HealthReport {
        let blob_store = match self.blobs.ping().await {
            Ok(()) => ComponentStatus::Up,
            Err(e) => {
                warn!(error = %e, "blob store health check failed");
                ComponentStatus::Down
            }
        };
        let metadata_store = match self.metadata.ping().await {
            Ok(()) => ComponentStatus::Up,
            Err(e) => {
                warn!(error = %e, "metadata store health check failed");
                ComponentStatus::Down
            }
        };

        let mut report = HealthReport {
            status: "ok",
            blob_store,
            metadata_store,
        };
        if !report.is_ok() {
            report.status = "degraded";
        }
        report
    }

    /// Release the metadata store; the manager refuses record work afterwards.
    pub async fn close(&self) -> GalleryResult<()> {
        self.metadata.close().await?;
        info!("metadata store closed");
        Ok(())
    }

    /// Stream a stored binary.
    pub async fn open_blob(&self, key: &str) -> GalleryResult<OpenedBlob> {
        Ok(self.blobs.open(key).await?)
    }

    fn validate_payload(&self, upload: &Upload) -> GalleryResult<()> {
        if !upload.content_type.starts_with("image/") {
            bail_gallery!(
                invalid_input,
                "Unsupported content type '{}': only images are accepted",
                upload.content_type
            );
        }
        if upload.is_empty() {
            bail_gallery!(invalid_input, "Uploaded file is empty");
        }
        let limit = self.max_payload_bytes();
        if upload.len() > limit {
            return Err(GalleryError::invalid_input(format!(
                "File of {} bytes exceeds the {} byte limit",
                upload.len(),
                limit
            ))
            .with_data(json!({ "limit": limit })));
        }
        Ok(())
    }

    async fn store_blob(&self, section: &str, name_for_ext: &str, upload: &Upload) -> GalleryResult<BlobReceipt> {
        let mut put = BlobPut::new()
            .with_content_type(upload.content_type.as_str())
            .with_filename(name_for_ext)
            .with_size_hint(upload.len())
            .with_annotation("section", section)
            .with_annotation("original_name", name_for_ext);
        if let Some((_, ext)) = name_for_ext.rsplit_once('.') {
            put = put.with_key_hint(HINT_EXTENSION, ext);
        }

        let receipt = self
            .blobs
            .put(section, put, stream_from_bytes(upload.bytes.clone()))
            .await?;
        debug!(key = %receipt.key, size = receipt.size_bytes, "blob stored");
        Ok(receipt)
    }

    async fn remove(&self, record: ItemRecord) -> GalleryResult<Deleted> {
        let id = record.id.clone();
        if !self.metadata.delete(&id).await? {
            bail_gallery!(not_found, "No item with id '{}'", id);
        }

        match self.blobs.delete(&record.blob_key).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!(%id, key = %record.blob_key, "blob was already gone");
            }
            Err(e) => {
                error!(%id, orphaned_key = %record.blob_key, error = %e, "record deleted but blob removal failed");
                return Err(GalleryError::partial_failure(
                    "Item record deleted, but its file could not be removed",
                )
                .with_data(json!({ "id": id, "orphanedBlobKey": record.blob_key }))
                .with_source(e));
            }
        }

        info!(%id, "item deleted");
        Ok(Deleted {
            id,
            blob_key: record.blob_key,
        })
    }

    async fn require(&self, id: &ItemId) -> GalleryResult<ItemRecord> {
        self.metadata
            .find_by_id(id)
            .await?
            .ok_or_else(|| GalleryError::not_found(format!("No item with id '{id}'")))
    }

    async fn discard_blob(&self, key: &str) {
        match self.blobs.delete(key).await {
            Ok(()) => info!(key, "compensating blob delete succeeded"),
            Err(e) => error!(key, error = %e, "compensating blob delete failed; blob orphaned"),
        }
    }

    fn present(&self, record: ItemRecord) -> GalleryItem {
        GalleryItem {
            url: self.blobs.url_for(&record.blob_key),
            slug: slug_for(&record.section, &record.title, &record.original_name),
            record,
        }
    }
}

fn trimmed(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Trimmed lowercase section; must be non-empty and URL-path safe.
pub fn normalize_section(raw: &str) -> GalleryResult<String> {
    let section = raw.trim().to_ascii_lowercase();
    if section.is_empty() {
        bail_gallery!(invalid_input, "section must not be empty");
    }
    if section.len() > MAX_SECTION_LEN
        || !section
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        bail_gallery!(
            invalid_input,
            "section '{}' may only contain letters, digits, '-' and '_'",
            raw.trim()
        );
    }
    Ok(section)
}

fn ensure_writable_section(section: &str) -> GalleryResult<()> {
    if RESERVED_SECTIONS.contains(&section) {
        bail_gallery!(invalid_input, "section '{}' is reserved", section);
    }
    Ok(())
}

/// Items uploaded in the trailing `days`; a window reaching past the
/// representable calendar covers everything.
fn window_filter(now: DateTime<Utc>, days: i64) -> ItemFilter {
    match Duration::try_days(days).and_then(|window| now.checked_sub_signed(window)) {
        Some(since) => ItemFilter::all().uploaded_since(since),
        None => ItemFilter::all(),
    }
}

/// Final path component of a client filename, defaulting to `upload`.
fn clean_original_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if base.is_empty() || base == "." || base == ".." {
        "upload".to_string()
    } else {
        base.to_string()
    }
}
