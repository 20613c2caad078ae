//! Metadata persistence: the [`MetadataStore`] trait and its implementations.

mod fs;
mod memory;

pub use fs::FsMetadataStore;
pub use memory::MemoryMetadataStore;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::item::{ItemId, ItemPatch, ItemRecord, NewItem};

pub type MetadataResult<T> = Result<T, MetadataError>;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Invalid item id: {id}")]
    InvalidId { id: String },

    #[error("Item not found: {id}")]
    NotFound { id: String },

    #[error("Metadata store is closed")]
    Closed,

    #[error("Corrupt record at {location}: {source}")]
    Corrupt {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Metadata backend error: {message}")]
    Backend { message: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl MetadataError {
    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn not_found(id: &ItemId) -> Self {
        Self::NotFound { id: id.to_string() }
    }
}

/// Record fields that support grouped counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemField {
    Section,
}

impl ItemField {
    pub fn value_of<'a>(&self, record: &'a ItemRecord) -> &'a str {
        match self {
            ItemField::Section => &record.section,
        }
    }
}

/// Conjunctive filter for [`MetadataStore::count_where`]; unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemFilter {
    pub uploaded_since: Option<DateTime<Utc>>,
}

impl ItemFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn uploaded_since(mut self, since: DateTime<Utc>) -> Self {
        self.uploaded_since = Some(since);
        self
    }

    pub fn matches(&self, record: &ItemRecord) -> bool {
        if let Some(since) = self.uploaded_since {
            if record.upload_date < since {
                return false;
            }
        }
        true
    }
}

/// Durable home of item records.
///
/// Implementations guarantee single-document atomicity: a concurrent `update` and
/// `delete` of the same id never leave a half-written record behind.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Prepare the store for use (create directories, connect, ...).
    async fn open(&self) -> MetadataResult<()>;

    /// Release resources; later calls fail with [`MetadataError::Closed`].
    async fn close(&self) -> MetadataResult<()>;

    async fn ping(&self) -> MetadataResult<()>;

    /// Validate a client-supplied id against this store's id format.
    fn parse_id(&self, raw: &str) -> MetadataResult<ItemId>;

    async fn create(&self, item: NewItem) -> MetadataResult<ItemId>;

    async fn find_by_id(&self, id: &ItemId) -> MetadataResult<Option<ItemRecord>>;

    /// All records of a section, in no particular order.
    async fn find_by_section(&self, section: &str) -> MetadataResult<Vec<ItemRecord>>;

    /// Apply `patch` and return the stored result; `NotFound` when absent.
    async fn update(&self, id: &ItemId, patch: &ItemPatch) -> MetadataResult<ItemRecord>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: &ItemId) -> MetadataResult<bool>;

    /// Record counts keyed by the value of `field`; zero counts are omitted.
    async fn count_grouped_by(&self, field: ItemField) -> MetadataResult<BTreeMap<String, u64>>;

    async fn count_where(&self, filter: &ItemFilter) -> MetadataResult<u64>;
}

/// Both shipped stores use hyphenated UUIDv4 ids.
pub(crate) fn new_uuid_id() -> ItemId {
    ItemId::new(Uuid::new_v4().to_string())
}

pub(crate) fn parse_uuid_id(raw: &str) -> MetadataResult<ItemId> {
    let trimmed = raw.trim();
    Uuid::try_parse(trimmed)
        .map(|uuid| ItemId::new(uuid.hyphenated().to_string()))
        .map_err(|_| MetadataError::InvalidId {
            id: raw.to_string(),
        })
}

pub(crate) fn group_counts<'a, I>(records: I, field: ItemField) -> BTreeMap<String, u64>
where
    I: IntoIterator<Item = &'a ItemRecord>,
{
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(field.value_of(record).to_string()).or_insert(0) += 1;
    }
    counts
}
