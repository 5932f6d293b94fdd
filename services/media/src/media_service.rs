//! Media lifecycle orchestration.
//!
//! Every operation that touches both the object store and the metadata
//! store orders the calls so that a failure leaves no metadata pointing
//! at a missing object: uploads write the object first, deletes destroy
//! the object first.

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{MediaError, MediaResult};
use crate::media::{MediaRecord, MediaUpdate, NewMedia, ResourceCategory, Visibility};
use crate::metadata_store::{MediaQuery, MetadataStore};
use crate::object_storage::{ObjectBody, ObjectStorage, ObjectUpload};
use crate::range::ByteRange;

/// Records per page for public listings
pub const PAGE_SIZE: i64 = 9;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// File part of an upload
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Raw upload input as received from the client
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub owner_id: Option<Uuid>,
    pub file: Option<UploadedFile>,
    pub keywords: Option<String>,
    pub visibility: Option<String>,
}

/// How a stored object is handed back to the caller
pub enum Delivery {
    /// Send the caller to the object's public URL
    Redirect(String),
    /// Proxy a byte range of a video
    Partial {
        range: ByteRange,
        content_type: String,
        body: ObjectBody,
    },
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delivery::Redirect(url) => f.debug_tuple("Redirect").field(url).finish(),
            Delivery::Partial {
                range,
                content_type,
                ..
            } => f
                .debug_struct("Partial")
                .field("range", range)
                .field("content_type", content_type)
                .finish_non_exhaustive(),
        }
    }
}

/// A record the purge could not remove
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeFailure {
    pub id: Uuid,
    pub reason: String,
}

/// Outcome of purging one owner's media
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub removed: Vec<Uuid>,
    pub failed: Vec<PurgeFailure>,
}

impl PurgeReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Media service over an object store and a metadata store
#[derive(Clone)]
pub struct MediaService {
    storage: Arc<dyn ObjectStorage>,
    store: Arc<dyn MetadataStore>,
    delete_concurrency: usize,
}

impl MediaService {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        store: Arc<dyn MetadataStore>,
        delete_concurrency: usize,
    ) -> Self {
        Self {
            storage,
            store,
            delete_concurrency: delete_concurrency.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// Store an uploaded file and record its metadata
    #[instrument(skip(self, request), fields(owner_id = ?request.owner_id))]
    pub async fn upload(&self, request: UploadRequest) -> MediaResult<MediaRecord> {
        let file = request
            .file
            .filter(|f| !f.data.is_empty())
            .ok_or_else(|| MediaError::validation("No file uploaded."))?;

        let visibility = request
            .visibility
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| MediaError::validation("Visibility is required."))
            .and_then(Visibility::from_str)?;

        let content_type = file
            .content_type
            .clone()
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let new_media = NewMedia::new(
            request.owner_id,
            request.keywords.as_deref().unwrap_or_default(),
            visibility,
            &content_type,
            file.data.len(),
        )?;

        let stored = self
            .storage
            .upload(ObjectUpload {
                file_name: file.file_name,
                content_type: new_media.content_type().to_string(),
                category: new_media.category(),
                data: file.data,
            })
            .await
            .map_err(|e| {
                metrics::counter!("media.upload_failures").increment(1);
                MediaError::from(e)
            })?;

        let category = new_media.category();
        let record = new_media.into_record(stored.key, stored.url);

        if let Err(e) = self.store.insert(&record).await {
            metrics::counter!("media.upload_failures").increment(1);
            self.compensate_upload(&record, category).await;
            return Err(e.into());
        }

        metrics::counter!("media.uploads").increment(1);
        info!(
            media_id = %record.id,
            storage_key = %record.storage_key,
            size_bytes = record.size_bytes,
            "Media uploaded"
        );

        Ok(record)
    }

    /// Remove an object whose metadata could not be written
    async fn compensate_upload(&self, record: &MediaRecord, category: ResourceCategory) {
        metrics::counter!("media.compensations").increment(1);

        match self.storage.destroy(&record.storage_key, category).await {
            Ok(outcome) if outcome.is_deleted() => {
                info!(storage_key = %record.storage_key, "Rolled back orphaned upload");
            }
            Ok(outcome) => {
                warn!(
                    storage_key = %record.storage_key,
                    outcome = ?outcome,
                    "Rollback of orphaned upload did not delete the object"
                );
            }
            Err(e) => {
                warn!(
                    storage_key = %record.storage_key,
                    error = %e,
                    "Rollback of orphaned upload failed, object is orphaned"
                );
            }
        }
    }

    async fn find_by_key(&self, storage_key: &str) -> MediaResult<MediaRecord> {
        self.store
            .get_by_storage_key(storage_key)
            .await?
            .ok_or_else(|| MediaError::not_found("Media Does Not Exist."))
    }

    async fn find_by_id(&self, id: Uuid) -> MediaResult<MediaRecord> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| MediaError::not_found("Media not found."))
    }

    /// Resolve how to deliver an object, honoring a `Range` header for video
    #[instrument(skip(self))]
    pub async fn retrieve(
        &self,
        storage_key: &str,
        range_header: Option<&str>,
    ) -> MediaResult<Delivery> {
        let record = self.find_by_key(storage_key).await?;

        let range_header = match range_header {
            Some(header) if record.is_video() => header,
            _ => {
                debug!(storage_key = %storage_key, "Redirecting to stored object");
                return Ok(Delivery::Redirect(record.storage_url));
            }
        };

        let range = ByteRange::resolve(range_header, record.size_bytes)?;
        metrics::counter!("media.range_requests").increment(1);

        let body = self
            .storage
            .fetch_range(&record.storage_key, range.start, range.end)
            .await?;

        debug!(
            storage_key = %storage_key,
            start = range.start,
            end = range.end,
            "Streaming video range"
        );

        Ok(Delivery::Partial {
            range,
            content_type: record.content_type,
            body,
        })
    }

    /// Public URL of a stored object, for downloads
    pub async fn download_url(&self, storage_key: &str) -> MediaResult<String> {
        Ok(self.find_by_key(storage_key).await?.storage_url)
    }

    /// Newest public media
    pub async fn list_public(&self) -> MediaResult<Vec<MediaRecord>> {
        let query = MediaQuery {
            visibility: Some(Visibility::Public),
            limit: Some(PAGE_SIZE),
            ..Default::default()
        };
        non_empty(self.store.query(&query).await?, "No Media Found.")
    }

    /// Everything one owner uploaded, newest first
    pub async fn list_by_owner(&self, owner_id: Uuid) -> MediaResult<Vec<MediaRecord>> {
        let query = MediaQuery {
            owner_id: Some(owner_id),
            ..Default::default()
        };
        non_empty(self.store.query(&query).await?, "No Media Found.")
    }

    /// Public media whose keywords contain `keyword`, ignoring case
    #[instrument(skip(self))]
    pub async fn search(&self, keyword: &str) -> MediaResult<Vec<MediaRecord>> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(MediaError::validation("Search keyword is required."));
        }

        let query = MediaQuery {
            visibility: Some(Visibility::Public),
            keyword: Some(keyword.to_string()),
            ..Default::default()
        };
        non_empty(self.store.query(&query).await?, "Searched files Not Found.")
    }

    /// One page of public media; pages are 1-based
    pub async fn page(&self, page: i64) -> MediaResult<Vec<MediaRecord>> {
        if page < 1 {
            return Err(MediaError::validation("Page must be 1 or greater."));
        }

        let offset = (page - 1)
            .checked_mul(PAGE_SIZE)
            .ok_or_else(|| MediaError::validation("Page is out of range."))?;

        let query = MediaQuery {
            visibility: Some(Visibility::Public),
            limit: Some(PAGE_SIZE),
            offset: Some(offset),
            ..Default::default()
        };
        non_empty(self.store.query(&query).await?, "More files dont exist.")
    }

    /// Change keywords and/or visibility of a caller-owned record
    #[instrument(skip(self, update))]
    pub async fn edit(
        &self,
        id: Uuid,
        caller: Uuid,
        update: MediaUpdate,
    ) -> MediaResult<MediaRecord> {
        if update.is_empty() {
            return Err(MediaError::validation(
                "Provide keywords or visibility to update.",
            ));
        }

        let record = self.find_by_id(id).await?;
        ensure_owner(&record, caller)?;

        let updated = self
            .store
            .update(id, &update)
            .await?
            .ok_or_else(|| MediaError::not_found("Media not found."))?;

        info!(media_id = %id, "Media details updated");
        Ok(updated)
    }

    /// Destroy the object, then the record; the record stays if the
    /// store does not confirm the destroy
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid, caller: Uuid) -> MediaResult<()> {
        let record = self.find_by_id(id).await?;
        ensure_owner(&record, caller)?;

        let category = record.category();
        let outcome = self
            .storage
            .destroy(&record.storage_key, category)
            .await?;

        if !outcome.is_deleted() {
            warn!(
                media_id = %id,
                storage_key = %record.storage_key,
                category = %category,
                outcome = ?outcome,
                "Storage did not confirm deletion, keeping metadata"
            );
            return Err(MediaError::StorageRejected(
                "Error deleting media from storage.".to_string(),
            ));
        }

        if !self.store.delete(id).await? {
            return Err(MediaError::not_found("Media not found."));
        }

        metrics::counter!("media.deletes").increment(1);
        info!(media_id = %id, "Media deleted");
        Ok(())
    }

    /// Remove every object and record belonging to an owner.
    ///
    /// Records whose object could not be destroyed are left in place and
    /// reported, so a later purge can pick them up again.
    #[instrument(skip(self))]
    pub async fn purge_owner(&self, owner_id: Uuid) -> MediaResult<PurgeReport> {
        let records = self
            .store
            .query(&MediaQuery {
                owner_id: Some(owner_id),
                ..Default::default()
            })
            .await?;

        let total = records.len();

        let results: Vec<Result<Uuid, PurgeFailure>> = stream::iter(records)
            .map(|record| async move { self.purge_record(record).await })
            .buffer_unordered(self.delete_concurrency)
            .collect()
            .await;

        let mut report = PurgeReport::default();
        for result in results {
            match result {
                Ok(id) => report.removed.push(id),
                Err(failure) => report.failed.push(failure),
            }
        }

        metrics::counter!("media.purged").increment(report.removed.len() as u64);

        if report.is_complete() {
            info!(owner_id = %owner_id, removed = total, "Owner media purged");
        } else {
            warn!(
                owner_id = %owner_id,
                removed = report.removed.len(),
                failed = report.failed.len(),
                "Owner media purge incomplete"
            );
        }

        Ok(report)
    }

    async fn purge_record(&self, record: MediaRecord) -> Result<Uuid, PurgeFailure> {
        let failure = |reason: String| PurgeFailure {
            id: record.id,
            reason,
        };

        match self
            .storage
            .destroy(&record.storage_key, record.category())
            .await
        {
            Ok(outcome) if outcome.is_deleted() => {}
            Ok(outcome) => return Err(failure(format!("storage reported {:?}", outcome))),
            Err(e) => return Err(failure(e.to_string())),
        }

        match self.store.delete(record.id).await {
            Ok(_) => Ok(record.id),
            Err(e) => Err(failure(e.to_string())),
        }
    }
}

fn ensure_owner(record: &MediaRecord, caller: Uuid) -> MediaResult<()> {
    if record.owner_id != caller {
        return Err(MediaError::forbidden("You do not own this media."));
    }
    Ok(())
}

fn non_empty(records: Vec<MediaRecord>, message: &str) -> MediaResult<Vec<MediaRecord>> {
    if records.is_empty() {
        return Err(MediaError::not_found(message));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StorageError, StoreError};
    use crate::memory_store::InMemoryMetadataStore;
    use crate::object_storage::{DestroyOutcome, MockObjectStorage, StoredObject};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use mockall::predicate::{eq, function};
    use mockall::Predicate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::assert_ok;

    fn key_is(expected: &str) -> impl Predicate<str> + Send + 'static {
        let expected = expected.to_string();
        function(move |key: &str| key == expected)
    }

    fn service_with(storage: MockObjectStorage, store: Arc<InMemoryMetadataStore>) -> MediaService {
        MediaService::new(Arc::new(storage), store, 2)
    }

    fn storage_accepting_uploads() -> MockObjectStorage {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut storage = MockObjectStorage::new();
        storage.expect_upload().returning(move |upload| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let key = format!("media/{}/2024-01-15/{}", upload.category, n);
            Ok(StoredObject {
                url: format!("https://cdn.example.com/{}", key),
                size_bytes: upload.data.len() as u64,
                content_type: upload.content_type,
                key,
            })
        });
        storage
    }

    fn upload_request(owner: Uuid, content_type: &str, keywords: &str, visible: &str) -> UploadRequest {
        UploadRequest {
            owner_id: Some(owner),
            file: Some(UploadedFile {
                file_name: Some("file.bin".to_string()),
                content_type: Some(content_type.to_string()),
                data: Bytes::from(vec![7u8; 64]),
            }),
            keywords: Some(keywords.to_string()),
            visibility: Some(visible.to_string()),
        }
    }

    async fn seed(
        store: &InMemoryMetadataStore,
        owner: Uuid,
        content_type: &str,
        keywords: &str,
        visibility: Visibility,
        minutes_ago: i64,
    ) -> MediaRecord {
        let category = ResourceCategory::from_content_type(content_type);
        let id = Uuid::new_v4();
        let mut record = NewMedia::new(Some(owner), keywords, visibility, content_type, 1000)
            .unwrap()
            .into_record(
                format!("media/{}/2024-01-15/{}", category, id),
                format!("https://cdn.example.com/{}", id),
            );
        record.created_at = Utc::now() - Duration::minutes(minutes_ago);
        record.updated_at = record.created_at;
        store.insert(&record).await.unwrap();
        record
    }

    #[tokio::test]
    async fn test_upload_creates_one_record_matching_storage() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let service = service_with(storage_accepting_uploads(), store.clone());
        let owner = Uuid::new_v4();

        let record = service
            .upload(upload_request(owner, "image/jpeg", "sunset", "public"))
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(record.storage_key, "media/image/2024-01-15/0");
        assert_eq!(
            record.storage_url,
            "https://cdn.example.com/media/image/2024-01-15/0"
        );
        assert_eq!(record.content_type, "image/jpeg");
        assert_eq!(record.size_bytes, 64);
        assert_eq!(record.owner_id, owner);

        let latest = service.list_public().await.unwrap();
        assert_eq!(latest[0].id, record.id);
    }

    #[tokio::test]
    async fn test_upload_without_file_is_rejected_before_storage() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let mut storage = MockObjectStorage::new();
        storage.expect_upload().never();
        let service = service_with(storage, store.clone());

        let mut request = upload_request(Uuid::new_v4(), "image/jpeg", "sunset", "public");
        request.file = None;

        assert!(matches!(
            service.upload(request).await,
            Err(MediaError::Validation(_))
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_upload_rejects_empty_file_and_missing_owner() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let mut storage = MockObjectStorage::new();
        storage.expect_upload().never();
        let service = service_with(storage, store.clone());

        let mut empty_file = upload_request(Uuid::new_v4(), "image/jpeg", "sunset", "public");
        if let Some(ref mut file) = empty_file.file {
            file.data = Bytes::new();
        }
        assert!(service.upload(empty_file).await.is_err());

        let mut no_owner = upload_request(Uuid::new_v4(), "image/jpeg", "sunset", "public");
        no_owner.owner_id = None;
        assert!(matches!(
            service.upload(no_owner).await,
            Err(MediaError::Validation(_))
        ));

        let bad_visibility = upload_request(Uuid::new_v4(), "image/jpeg", "sunset", "friends");
        assert!(service.upload(bad_visibility).await.is_err());

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_upload_storage_failure_creates_nothing() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let mut storage = MockObjectStorage::new();
        storage
            .expect_upload()
            .returning(|_| Err(StorageError::UploadFailed("503".to_string())));
        let service = service_with(storage, store.clone());

        let result = service
            .upload(upload_request(Uuid::new_v4(), "video/mp4", "clip", "public"))
            .await;

        assert!(matches!(result, Err(MediaError::Storage(_))));
        assert!(store.is_empty().await);
    }

    /// Store that refuses every insert
    struct FailingInsertStore;

    #[async_trait]
    impl MetadataStore for FailingInsertStore {
        async fn insert(&self, record: &MediaRecord) -> Result<(), StoreError> {
            Err(StoreError::DuplicateKey(record.storage_key.clone()))
        }
        async fn get(&self, _id: Uuid) -> Result<Option<MediaRecord>, StoreError> {
            Ok(None)
        }
        async fn get_by_storage_key(&self, _key: &str) -> Result<Option<MediaRecord>, StoreError> {
            Ok(None)
        }
        async fn query(&self, _query: &MediaQuery) -> Result<Vec<MediaRecord>, StoreError> {
            Ok(Vec::new())
        }
        async fn update(
            &self,
            _id: Uuid,
            _update: &MediaUpdate,
        ) -> Result<Option<MediaRecord>, StoreError> {
            Ok(None)
        }
        async fn delete(&self, _id: Uuid) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_metadata_failure_destroys_uploaded_object() {
        let mut storage = storage_accepting_uploads();
        storage
            .expect_destroy()
            .with(key_is("media/raw/2024-01-15/0"), eq(ResourceCategory::Raw))
            .times(1)
            .returning(|_, _| Ok(DestroyOutcome::Deleted));
        let service = MediaService::new(Arc::new(storage), Arc::new(FailingInsertStore), 2);

        let result = service
            .upload(upload_request(Uuid::new_v4(), "application/pdf", "report", "private"))
            .await;

        assert!(matches!(result, Err(MediaError::Store(_))));
    }

    #[tokio::test]
    async fn test_listing_excludes_private_and_caps_at_page_size() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let owner = Uuid::new_v4();
        for i in 0..12 {
            seed(&store, owner, "image/png", "sunset", Visibility::Public, i).await;
        }
        let private = seed(&store, owner, "image/png", "sunset", Visibility::Private, 0).await;
        let service = service_with(MockObjectStorage::new(), store);

        let latest = service.list_public().await.unwrap();
        assert_eq!(latest.len(), 9);
        assert!(latest.iter().all(|r| r.id != private.id));
        assert!(latest
            .windows(2)
            .all(|pair| pair[0].created_at >= pair[1].created_at));
    }

    #[tokio::test]
    async fn test_empty_listing_is_not_found() {
        let store = Arc::new(InMemoryMetadataStore::new());
        seed(&store, Uuid::new_v4(), "image/png", "x", Visibility::Private, 0).await;
        let service = service_with(MockObjectStorage::new(), store);

        assert!(matches!(
            service.list_public().await,
            Err(MediaError::NotFound(_))
        ));
        assert!(matches!(
            service.list_by_owner(Uuid::new_v4()).await,
            Err(MediaError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_by_owner_includes_private() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let owner = Uuid::new_v4();
        seed(&store, owner, "image/png", "a", Visibility::Private, 1).await;
        seed(&store, owner, "video/mp4", "b", Visibility::Public, 0).await;
        seed(&store, Uuid::new_v4(), "image/png", "c", Visibility::Public, 0).await;
        let service = service_with(MockObjectStorage::new(), store);

        let mine = service.list_by_owner(owner).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].keywords, "b");
        assert!(mine.iter().all(|r| r.owner_id == owner));
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_public_only() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let owner = Uuid::new_v4();
        let hit = seed(&store, owner, "image/png", "Golden SUNSET", Visibility::Public, 0).await;
        seed(&store, owner, "image/png", "sunset private", Visibility::Private, 0).await;
        seed(&store, owner, "image/png", "mountain", Visibility::Public, 0).await;
        let service = service_with(MockObjectStorage::new(), store);

        let results = service.search("sunset").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, hit.id);

        assert!(matches!(
            service.search("ocean").await,
            Err(MediaError::NotFound(_))
        ));
        assert!(matches!(
            service.search("  ").await,
            Err(MediaError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_pages_partition_public_set() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let owner = Uuid::new_v4();
        let mut expected = Vec::new();
        for i in 0..20 {
            expected.push(seed(&store, owner, "image/png", "p", Visibility::Public, i).await.id);
            seed(&store, owner, "image/png", "hidden", Visibility::Private, i).await;
        }
        let service = service_with(MockObjectStorage::new(), store);

        let mut collected = Vec::new();
        for page in 1..=3 {
            let records = service.page(page).await.unwrap();
            assert!(records.iter().all(|r| r.is_public()));
            collected.extend(records.into_iter().map(|r| r.id));
        }

        assert_eq!(collected, expected);
        assert!(matches!(service.page(4).await, Err(MediaError::NotFound(_))));
        assert!(matches!(service.page(0).await, Err(MediaError::Validation(_))));
    }

    #[tokio::test]
    async fn test_edit_without_fields_leaves_record_unchanged() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let owner = Uuid::new_v4();
        let record = seed(&store, owner, "image/png", "sunset", Visibility::Public, 0).await;
        let service = service_with(MockObjectStorage::new(), store.clone());

        let result = service.edit(record.id, owner, MediaUpdate::default()).await;

        assert!(matches!(result, Err(MediaError::Validation(_))));
        assert_eq!(store.get(record.id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_edit_updates_mutable_fields() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let owner = Uuid::new_v4();
        let record = seed(&store, owner, "image/png", "sunset", Visibility::Public, 5).await;
        let service = service_with(MockObjectStorage::new(), store);

        let update = MediaUpdate::from_raw(Some("beach"), Some("private")).unwrap();
        let updated = service.edit(record.id, owner, update).await.unwrap();

        assert_eq!(updated.keywords, "beach");
        assert_eq!(updated.visibility, Visibility::Private);
        assert_eq!(updated.owner_id, owner);
        assert_eq!(updated.storage_key, record.storage_key);
        assert!(updated.updated_at > record.updated_at);
    }

    #[tokio::test]
    async fn test_edit_by_other_user_is_forbidden() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let record = seed(&store, Uuid::new_v4(), "image/png", "sunset", Visibility::Public, 0).await;
        let service = service_with(MockObjectStorage::new(), store.clone());

        let update = MediaUpdate::from_raw(Some("stolen"), None).unwrap();
        assert!(matches!(
            service.edit(record.id, Uuid::new_v4(), update).await,
            Err(MediaError::Forbidden(_))
        ));
        assert_eq!(store.get(record.id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_delete_pdf_uses_raw_category() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let owner = Uuid::new_v4();
        let record = seed(&store, owner, "application/pdf", "doc", Visibility::Private, 0).await;

        let mut storage = MockObjectStorage::new();
        storage
            .expect_destroy()
            .with(key_is(&record.storage_key), eq(ResourceCategory::Raw))
            .times(1)
            .returning(|_, _| Ok(DestroyOutcome::Deleted));
        let service = service_with(storage, store.clone());

        assert_ok!(service.delete(record.id, owner).await);
        assert!(store.get(record.id).await.unwrap().is_none());

        // Second delete only reaches the metadata store
        assert!(matches!(
            service.delete(record.id, owner).await,
            Err(MediaError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_keeps_record_when_storage_does_not_confirm() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let owner = Uuid::new_v4();
        let record = seed(&store, owner, "application/pdf", "doc", Visibility::Private, 0).await;

        let mut storage = MockObjectStorage::new();
        storage
            .expect_destroy()
            .returning(|_, _| Ok(DestroyOutcome::NotFound));
        let service = service_with(storage, store.clone());

        let result = service.delete(record.id, owner).await;

        assert!(matches!(result, Err(MediaError::StorageRejected(_))));
        assert!(store.get(record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_keeps_record_on_storage_error() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let owner = Uuid::new_v4();
        let record = seed(&store, owner, "video/mp4", "clip", Visibility::Public, 0).await;

        let mut storage = MockObjectStorage::new();
        storage
            .expect_destroy()
            .with(key_is(&record.storage_key), eq(ResourceCategory::Video))
            .returning(|_, _| Err(StorageError::DeleteFailed("timeout".to_string())));
        let service = service_with(storage, store.clone());

        assert!(matches!(
            service.delete(record.id, owner).await,
            Err(MediaError::Storage(_))
        ));
        assert!(store.get(record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_by_other_user_is_forbidden() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let record = seed(&store, Uuid::new_v4(), "image/png", "x", Visibility::Public, 0).await;

        let mut storage = MockObjectStorage::new();
        storage.expect_destroy().never();
        let service = service_with(storage, store.clone());

        assert!(matches!(
            service.delete(record.id, Uuid::new_v4()).await,
            Err(MediaError::Forbidden(_))
        ));
        assert!(store.get(record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_retrieve_video_range() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let record = seed(&store, Uuid::new_v4(), "video/mp4", "clip", Visibility::Public, 0).await;

        let mut storage = MockObjectStorage::new();
        storage
            .expect_fetch_range()
            .with(key_is(&record.storage_key), eq(100u64), eq(999u64))
            .times(1)
            .returning(|_, _, _| Ok(stream::iter(vec![Ok(Bytes::from(vec![0u8; 900]))]).boxed()));
        let service = service_with(storage, store);

        match service
            .retrieve(&record.storage_key, Some("bytes=100-"))
            .await
            .unwrap()
        {
            Delivery::Partial {
                range,
                content_type,
                ..
            } => {
                assert_eq!(range.content_range(), "bytes 100-999/1000");
                assert_eq!(range.content_length(), 900);
                assert_eq!(content_type, "video/mp4");
            }
            other => panic!("Expected partial content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retrieve_redirects_without_range_or_for_images() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let owner = Uuid::new_v4();
        let video = seed(&store, owner, "video/mp4", "clip", Visibility::Public, 0).await;
        let image = seed(&store, owner, "image/jpeg", "pic", Visibility::Public, 0).await;

        let mut storage = MockObjectStorage::new();
        storage.expect_fetch_range().never();
        let service = service_with(storage, store);

        assert!(matches!(
            service.retrieve(&video.storage_key, None).await.unwrap(),
            Delivery::Redirect(ref url) if *url == video.storage_url
        ));
        assert!(matches!(
            service.retrieve(&image.storage_key, Some("bytes=0-")).await.unwrap(),
            Delivery::Redirect(ref url) if *url == image.storage_url
        ));
        assert!(matches!(
            service.retrieve("media/image/missing", None).await,
            Err(MediaError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_download_url() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let record = seed(&store, Uuid::new_v4(), "application/pdf", "doc", Visibility::Private, 0).await;
        let service = service_with(MockObjectStorage::new(), store);

        assert_eq!(
            service.download_url(&record.storage_key).await.unwrap(),
            record.storage_url
        );
        assert!(service.download_url("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_purge_removes_only_confirmed_objects() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let owner = Uuid::new_v4();
        let kept = seed(&store, owner, "video/mp4", "a", Visibility::Public, 0).await;
        let gone_image = seed(&store, owner, "image/png", "b", Visibility::Public, 1).await;
        let gone_doc = seed(&store, owner, "application/pdf", "c", Visibility::Private, 2).await;
        let bystander = seed(&store, Uuid::new_v4(), "image/png", "d", Visibility::Public, 0).await;

        let failing_key = kept.storage_key.clone();
        let mut storage = MockObjectStorage::new();
        storage.expect_destroy().times(3).returning(move |key, _| {
            if key == failing_key {
                Err(StorageError::DeleteFailed("throttled".to_string()))
            } else {
                Ok(DestroyOutcome::Deleted)
            }
        });
        let service = service_with(storage, store.clone());

        let report = service.purge_owner(owner).await.unwrap();

        assert_eq!(report.removed.len(), 2);
        assert!(report.removed.contains(&gone_image.id));
        assert!(report.removed.contains(&gone_doc.id));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, kept.id);
        assert!(!report.is_complete());

        assert!(store.get(kept.id).await.unwrap().is_some());
        assert!(store.get(bystander.id).await.unwrap().is_some());
        assert!(store.get(gone_image.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_of_owner_without_media() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let mut storage = MockObjectStorage::new();
        storage.expect_destroy().never();
        let service = service_with(storage, store);

        let report = service.purge_owner(Uuid::new_v4()).await.unwrap();
        assert!(report.is_complete());
        assert!(report.removed.is_empty());
    }
}
