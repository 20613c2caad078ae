//! # gallery-blob: blob storage infrastructure for the gallery asset service
//!
//! `gallery-blob` owns everything about image binaries: where they live, how their keys are
//! generated, how large they may be and under which URL they are published. The asset layer
//! never touches a storage backend directly; it embeds a [`BlobAdapter`].
//!
//! ## Quick Start
//!
//! ```rust
//! use gallery_blob::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> BlobResult<()> {
//! let store = Arc::new(MemoryBlobStore::new("http://localhost:3030/uploads"));
//! let adapter = BlobAdapter::new(store, BlobConfig::default());
//!
//! let put = BlobPut::new()
//!     .with_content_type("image/jpeg")
//!     .with_filename("sunset.jpg")
//!     .with_key_hint("extension", "jpg")
//!     .with_annotation("section", "paintings");
//!
//! let receipt = adapter.put("paintings", put, stream_from_bytes(&b"..."[..])).await?;
//! assert!(receipt.url.ends_with(".jpg"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  AssetManager   │  ← lifecycle + metadata consistency
//! ├─────────────────┤
//! │   BlobAdapter   │  ← keys, size guard, receipts
//! ├─────────────────┤
//! │   BlobStore     │  ← memory / filesystem / S3-compatible
//! └─────────────────┘
//! ```

pub mod adapter;
mod config;
mod error;
mod fs_store;
mod memory_store;
mod receipt;
mod s3_store;
pub mod store;
mod types;

pub use adapter::BlobAdapter;
pub use config::{BlobConfig, DEFAULT_MAX_BLOB_BYTES};
pub use error::{BlobError, BlobResult};
pub use fs_store::FsBlobStore;
pub use memory_store::MemoryBlobStore;
pub use receipt::{BlobReceipt, OpenedBlob};
pub use s3_store::{S3CompatibleStore, S3Config};
pub use store::{
    BlobKeyStrategy, BlobStore, DefaultKeyStrategy, GetResult, ObjectHead, PutResult,
    StoreCapabilities, HINT_EXTENSION,
};
pub use types::{
    collect_stream, content_type_for_key, stream_from_bytes, validate_key, Annotations, BlobId, BlobPut, ByteStream,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        stream_from_bytes, BlobAdapter, BlobConfig, BlobError, BlobPut, BlobReceipt, BlobResult,
        BlobStore, ByteStream, MemoryBlobStore,
    };
}
