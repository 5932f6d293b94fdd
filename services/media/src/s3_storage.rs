use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::media::ResourceCategory;
use crate::object_storage::{DestroyOutcome, ObjectBody, ObjectStorage, ObjectUpload, StoredObject};
use anyhow::Result;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// S3-compatible object storage for uploaded media
pub struct S3ObjectStorage {
    client: S3Client,
    bucket: String,
    config: StorageConfig,
}

impl S3ObjectStorage {
    /// Create a new S3 storage client
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 object storage initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            config: config.clone(),
        })
    }

    /// Single-part upload for small files
    async fn simple_upload(&self, upload: &ObjectUpload, key: &str) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(upload.data.clone()))
            .content_type(&upload.content_type)
            .metadata("resource-category", upload.category.as_str())
            .metadata("original-filename", upload.file_name.as_deref().unwrap_or(""))
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    /// Multipart upload for large files
    async fn multipart_upload(&self, upload: &ObjectUpload, key: &str) -> Result<(), StorageError> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&upload.content_type)
            .metadata("resource-category", upload.category.as_str())
            .metadata("original-filename", upload.file_name.as_deref().unwrap_or(""))
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(DisplayErrorContext(&e).to_string()))?;

        let upload_id = create_response
            .upload_id()
            .ok_or_else(|| StorageError::UploadFailed("no upload ID in response".to_string()))?;

        match self.upload_parts(upload, key, upload_id).await {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| StorageError::UploadFailed(DisplayErrorContext(&e).to_string()))?;
                Ok(())
            }
            Err(e) => {
                // Parts already written are billed until the upload is aborted
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .send()
                    .await
                {
                    warn!(
                        key = %key,
                        error = %DisplayErrorContext(&abort_err),
                        "Failed to abort multipart upload"
                    );
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        upload: &ObjectUpload,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<CompletedPart>, StorageError> {
        let mut completed_parts = Vec::new();
        let part_size = self.config.part_size_bytes.max(1);

        for (index, chunk) in upload.data.chunks(part_size).enumerate() {
            let part_number = index as i32 + 1;
            let part = upload.data.slice_ref(chunk);

            let response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part))
                .send()
                .await
                .map_err(|e| StorageError::UploadFailed(DisplayErrorContext(&e).to_string()))?;

            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(response.e_tag().unwrap_or_default())
                    .build(),
            );
        }

        Ok(completed_parts)
    }

    /// Check if an object exists
    async fn object_exists(&self, key: &str) -> Result<bool, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(false)
                } else {
                    Err(StorageError::DeleteFailed(DisplayErrorContext(&e).to_string()))
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    #[instrument(skip(self, upload), fields(category = %upload.category, size_bytes = upload.data.len()))]
    async fn upload(&self, upload: ObjectUpload) -> Result<StoredObject, StorageError> {
        let key = object_key(
            &self.config.key_prefix,
            &upload,
            Utc::now(),
            Uuid::new_v4(),
        );

        debug!(key = %key, "Uploading object to S3");

        if upload.data.len() > self.config.multipart_threshold_bytes {
            self.multipart_upload(&upload, &key).await?;
        } else {
            self.simple_upload(&upload, &key).await?;
        }

        info!(key = %key, "Object uploaded successfully");

        Ok(StoredObject {
            url: self.config.public_url(&key),
            size_bytes: upload.data.len() as u64,
            content_type: upload.content_type,
            key,
        })
    }

    #[instrument(skip(self))]
    async fn destroy(
        &self,
        key: &str,
        category: ResourceCategory,
    ) -> Result<DestroyOutcome, StorageError> {
        if !key_in_category(&self.config.key_prefix, key, category) {
            warn!(key = %key, category = %category, "Key is not stored under this category");
            return Ok(DestroyOutcome::NotFound);
        }

        if !self.object_exists(key).await? {
            return Ok(DestroyOutcome::NotFound);
        }

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(DisplayErrorContext(&e).to_string()))?;

        debug!(key = %key, "Object deleted from S3");
        Ok(DestroyOutcome::Deleted)
    }

    #[instrument(skip(self))]
    async fn fetch_range(
        &self,
        key: &str,
        start: u64,
        end: u64,
    ) -> Result<ObjectBody, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(format!("bytes={}-{}", start, end))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::FetchFailed(DisplayErrorContext(&e).to_string())
                }
            })?;

        let stream = ReaderStream::new(response.body.into_async_read())
            .map(|chunk| chunk.map_err(|e| StorageError::FetchFailed(e.to_string())));

        Ok(stream.boxed())
    }
}

/// Object key for an upload.
/// Format: {prefix}/{category}/{date}/{id}.{ext}
///
/// The category segment lets a destroy request be checked against the
/// category it was stored under.
fn object_key(prefix: &str, upload: &ObjectUpload, now: DateTime<Utc>, id: Uuid) -> String {
    let date = now.format("%Y-%m-%d");
    let extension = upload
        .file_name
        .as_deref()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| sanitize_path_component(ext).to_lowercase())
        .filter(|ext| !ext.is_empty());

    match extension {
        Some(ext) => format!(
            "{}/{}/{}/{}.{}",
            sanitize_path_component(prefix),
            upload.category,
            date,
            id,
            ext
        ),
        None => format!(
            "{}/{}/{}/{}",
            sanitize_path_component(prefix),
            upload.category,
            date,
            id
        ),
    }
}

fn key_in_category(prefix: &str, key: &str, category: ResourceCategory) -> bool {
    let expected = format!("{}/{}/", sanitize_path_component(prefix), category);
    key.starts_with(&expected)
}

/// Sanitize a path component to prevent path traversal
fn sanitize_path_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}
