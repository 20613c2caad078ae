//! # Errors (Feathers-style)
//!
//! The gallery core reports failures through one structured error type.
//! Core goals:
//! - a small taxonomy the HTTP layer maps to status codes
//! - store failures say *which* store failed without leaking backend details
//! - can be carried through `anyhow::Error` and recovered by downcasting

use std::fmt;

use anyhow::Error as AnyError;
use gallery_blob::BlobError;
use serde_json::{json, Value};

use crate::metadata::MetadataError;

/// A convenience result type for gallery core APIs.
pub type GalleryResult<T> = std::result::Result<T, GalleryError>;

/// Which collaborator a [`ErrorKind::StoreFailure`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Store {
    Blob,
    Metadata,
}

impl Store {
    pub fn as_str(&self) -> &'static str {
        match self {
            Store::Blob => "blob",
            Store::Metadata => "metadata",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,        // 400
    NotFound,            // 404
    StoreFailure(Store), // 500
    PartialFailure,      // 500
    GeneralError,        // 500
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::InvalidInput => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::StoreFailure(_) => 500,
            ErrorKind::PartialFailure => 500,
            ErrorKind::GeneralError => 500,
        }
    }

    /// Feathers error `name`
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "BadRequest",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::StoreFailure(_) => "StoreFailure",
            ErrorKind::PartialFailure => "PartialFailure",
            ErrorKind::GeneralError => "GeneralError",
        }
    }

    /// Feathers error `className` (kebab-cased)
    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "bad-request",
            ErrorKind::NotFound => "not-found",
            ErrorKind::StoreFailure(_) => "store-failure",
            ErrorKind::PartialFailure => "partial-failure",
            ErrorKind::GeneralError => "general-error",
        }
    }
}

/// A structured gallery error that can live inside `anyhow::Error`.
///
/// Mirrors Feathers-style fields: name, message, code (HTTP status), class_name
/// and optional `data`. The `source` chain is for logs only.
#[derive(Debug)]
pub struct GalleryError {
    pub kind: ErrorKind,
    pub message: String,
    pub data: Option<Value>,
    pub source: Option<AnyError>,
}

impl GalleryError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            source: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_source(mut self, source: impl Into<AnyError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Convert into `anyhow::Error`.
    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    /// Turn any error into a GalleryError:
    /// - if it's already a GalleryError, keep it (lossless)
    /// - otherwise wrap as GeneralError
    pub fn normalize(err: AnyError) -> GalleryError {
        match err.downcast::<GalleryError>() {
            Ok(gallery) => gallery,
            Err(other) => GalleryError::general_error(other.to_string()).with_source(other),
        }
    }

    /// A "safe" version suitable for returning to clients: the inner `source` is dropped.
    pub fn sanitize_for_client(&self) -> GalleryError {
        GalleryError {
            kind: self.kind,
            message: self.message.clone(),
            data: self.data.clone(),
            source: None,
        }
    }

    /// Feathers-ish JSON payload.
    pub fn to_json(&self) -> Value {
        let mut base = json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.class_name(),
        });

        if let Some(d) = &self.data {
            base["data"] = d.clone();
        }
        base
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn general_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::GeneralError, msg)
    }
    pub fn partial_failure(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::PartialFailure, msg)
    }

    /// Store failure with a generic client message; backend detail stays in `source`.
    pub fn store_failure(store: Store, source: impl Into<AnyError>) -> Self {
        Self::new(
            ErrorKind::StoreFailure(store),
            format!("The {} store failed to complete the operation", store.as_str()),
        )
        .with_data(json!({ "store": store.as_str() }))
        .with_source(source)
    }
}

impl fmt::Display for GalleryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.message)
    }
}

impl std::error::Error for GalleryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<BlobError> for GalleryError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound { key } => GalleryError::not_found(format!("No blob stored under '{key}'")),
            BlobError::TooLarge { size, limit } => GalleryError::invalid_input(format!(
                "Payload of {size} bytes exceeds the {limit} byte limit"
            )),
            BlobError::Invalid { message } => GalleryError::invalid_input(message),
            other => GalleryError::store_failure(Store::Blob, other),
        }
    }
}

impl From<MetadataError> for GalleryError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::InvalidId { id } => {
                GalleryError::invalid_input(format!("'{id}' is not a valid item id"))
            }
            MetadataError::NotFound { id } => GalleryError::not_found(format!("No item with id '{id}'")),
            other => GalleryError::store_failure(Store::Metadata, other),
        }
    }
}

/// Convenience helper for "bail with GalleryError".
#[macro_export]
macro_rules! bail_gallery {
    ($ctor:ident, $msg:expr) => {
        return Err($crate::errors::GalleryError::$ctor($msg))
    };
    ($ctor:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::GalleryError::$ctor(format!($fmt, $($arg)*)))
    };
}
