use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Section whose items carry materials and dimensions.
pub const PAINTINGS: &str = "paintings";

/// Section used when an upload names none.
pub const DEFAULT_SECTION: &str = "others";

/// Opaque item identifier assigned by the metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The persisted half of a gallery item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub id: ItemId,
    pub section: String,
    pub blob_key: String,
    pub original_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub materials: String,
    #[serde(default)]
    pub dimensions: String,
    pub upload_date: DateTime<Utc>,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub size_bytes: u64,
}

/// Everything needed to create a record; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub section: String,
    pub blob_key: String,
    pub original_name: String,
    pub title: String,
    pub description: String,
    pub materials: String,
    pub dimensions: String,
    pub upload_date: DateTime<Utc>,
    pub content_type: String,
    pub size_bytes: u64,
}

impl NewItem {
    pub fn into_record(self, id: ItemId) -> ItemRecord {
        ItemRecord {
            id,
            section: self.section,
            blob_key: self.blob_key,
            original_name: self.original_name,
            title: self.title,
            description: self.description,
            materials: self.materials,
            dimensions: self.dimensions,
            upload_date: self.upload_date,
            content_type: self.content_type,
            size_bytes: self.size_bytes,
        }
    }
}

/// A record as presented to callers: persisted fields plus derived `url` and `slug`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryItem {
    #[serde(flatten)]
    pub record: ItemRecord,
    pub url: String,
    pub slug: String,
}

impl std::ops::Deref for GalleryItem {
    type Target = ItemRecord;

    fn deref(&self) -> &ItemRecord {
        &self.record
    }
}

/// Descriptive fields supplied by a client. `None` means "not supplied";
/// `Some("")` is an explicit empty value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ItemFields {
    pub section: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub materials: Option<String>,
    #[serde(alias = "paintingSize")]
    pub dimensions: Option<String>,
}

impl ItemFields {
    pub fn is_empty(&self) -> bool {
        self.section.is_none()
            && self.title.is_none()
            && self.description.is_none()
            && self.materials.is_none()
            && self.dimensions.is_none()
    }
}

/// Partial update applied by the metadata store; only `Some` fields change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub section: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub materials: Option<String>,
    pub dimensions: Option<String>,
    pub blob_key: Option<String>,
    pub content_type: Option<String>,
    pub size_bytes: Option<u64>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        *self == ItemPatch::default()
    }

    pub fn apply(&self, record: &mut ItemRecord) {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }

        set(&mut record.section, &self.section);
        set(&mut record.title, &self.title);
        set(&mut record.description, &self.description);
        set(&mut record.materials, &self.materials);
        set(&mut record.dimensions, &self.dimensions);
        set(&mut record.blob_key, &self.blob_key);
        set(&mut record.content_type, &self.content_type);
        set(&mut record.size_bytes, &self.size_bytes);
    }
}

/// An image payload handed to the asset manager.
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Bytes,
    pub content_type: String,
    pub original_name: String,
}

impl Upload {
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>, original_name: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
            original_name: original_name.into(),
        }
    }

    /// Trimmed, lowercased content type.
    pub fn normalized(mut self) -> Self {
        self.content_type = self.content_type.trim().to_ascii_lowercase();
        self
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionStats {
    pub sections: BTreeMap<String, u64>,
    pub total: u64,
    pub recent_uploads: u64,
    pub monthly_uploads: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Deleted {
    pub id: ItemId,
    #[serde(rename = "blobKey")]
    pub blob_key: String,
}
