//! gallery-core: framework-agnostic core for the gallery asset service.

pub mod assets;
pub mod config;
pub mod errors;
pub mod item;
pub mod metadata;
pub mod slug;

pub use assets::{normalize_section, AssetManager, AssetSettings, ComponentStatus, HealthReport, RESERVED_SECTIONS};
pub use config::{GalleryConfig, GalleryConfigSnapshot, ENV_PREFIX};
pub use errors::{ErrorKind, GalleryError, GalleryResult, Store};
pub use item::{
    Deleted, GalleryItem, ItemFields, ItemId, ItemPatch, ItemRecord, NewItem, SectionStats, Upload,
    DEFAULT_SECTION, PAINTINGS,
};
pub use metadata::{
    FsMetadataStore, ItemField, ItemFilter, MemoryMetadataStore, MetadataError, MetadataResult, MetadataStore,
};
pub use slug::{slug_for, slugify};
