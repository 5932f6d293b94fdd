//! Media Service
//!
//! Upload, catalogue and delivery service for user media. Files are written
//! to S3-compatible object storage, described by metadata records in
//! PostgreSQL, and served back through a small REST API.
//!
//! ## Features
//!
//! - **Uploads**: multipart ingest with content-type based resource
//!   categories and multipart S3 writes for large files
//! - **Catalogue**: public listings, keyword search and paging, plus
//!   per-owner listings behind bearer-token sign-in
//! - **Delivery**: redirects to the stored object, or ranged proxying for
//!   video seeking
//! - **Lifecycle**: owner-checked edits and deletes, and bulk purge of an
//!   owner's media
//!
//! ## Architecture
//!
//! ```text
//!   HTTP (axum)              Media Service              Backends
//! ┌──────────────┐         ┌──────────────┐         ┌──────────────┐
//! │ routes       │────────▶│ upload       │────────▶│ S3 object    │
//! │ auth         │         │ retrieve     │         │ storage      │
//! └──────────────┘         │ list/search  │         └──────────────┘
//!                          │ edit/delete  │         ┌──────────────┐
//!                          │ purge        │────────▶│ PostgreSQL / │
//!                          └──────────────┘         │ in-memory    │
//!                                                   └──────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod media;
pub mod media_service;
pub mod memory_store;
pub mod metadata_store;
pub mod object_storage;
pub mod range;
pub mod routes;
pub mod s3_storage;

pub use config::Config;
pub use error::{MediaError, MediaResult, StorageError, StoreError};
pub use media::{MediaRecord, MediaUpdate, NewMedia, ResourceCategory, Visibility};
pub use media_service::{Delivery, MediaService, PurgeReport, UploadRequest, UploadedFile};
pub use memory_store::InMemoryMetadataStore;
pub use metadata_store::{MediaQuery, MetadataStore, PgMetadataStore};
pub use object_storage::{DestroyOutcome, ObjectStorage, ObjectUpload, StoredObject};
pub use routes::{start_api_server, AppState};
pub use s3_storage::S3ObjectStorage;
