//! Object storage abstraction.
//!
//! The media service only needs three things from a remote store: write an
//! object and learn its key and public URL, destroy an object by key, and
//! read back a byte range for video seeking.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::StorageError;
use crate::media::ResourceCategory;

/// Streamed object bytes
pub type ObjectBody = BoxStream<'static, Result<Bytes, StorageError>>;

/// An object to be written
#[derive(Debug, Clone)]
pub struct ObjectUpload {
    /// Name the client uploaded the file under; only its extension is kept
    pub file_name: Option<String>,
    pub content_type: String,
    /// Auto-detected resource category, becomes part of the key
    pub category: ResourceCategory,
    pub data: Bytes,
}

/// What the store reports back after a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    pub size_bytes: u64,
    pub content_type: String,
}

/// Result of a destroy request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    Deleted,
    /// Nothing was stored under that key and category
    NotFound,
}

impl DestroyOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, DestroyOutcome::Deleted)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Write an object, returning its key and public URL
    async fn upload(&self, upload: ObjectUpload) -> Result<StoredObject, StorageError>;

    /// Remove an object
    async fn destroy(
        &self,
        key: &str,
        category: ResourceCategory,
    ) -> Result<DestroyOutcome, StorageError>;

    /// Stream the inclusive byte range `start..=end` of an object
    async fn fetch_range(&self, key: &str, start: u64, end: u64)
        -> Result<ObjectBody, StorageError>;
}
