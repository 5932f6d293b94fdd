//! Media records and the validated inputs that create or change them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{MediaError, MediaResult};

/// Whether a record shows up in unauthenticated listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Public => "public",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(MediaError::validation(format!(
                "Visibility must be 'public' or 'private', got '{}'.",
                other
            ))),
        }
    }
}

/// Storage resource category, auto-detected from the content type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceCategory {
    Image,
    Video,
    Raw,
}

impl ResourceCategory {
    pub fn from_content_type(content_type: &str) -> Self {
        let content_type = content_type.trim().to_ascii_lowercase();
        if content_type.starts_with("video/") {
            ResourceCategory::Video
        } else if content_type.starts_with("application/") {
            ResourceCategory::Raw
        } else {
            ResourceCategory::Image
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::Image => "image",
            ResourceCategory::Video => "video",
            ResourceCategory::Raw => "raw",
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted metadata for one stored object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// Key assigned by the object store
    pub storage_key: String,
    /// Public URL returned by the object store
    pub storage_url: String,
    pub visibility: Visibility,
    pub keywords: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaRecord {
    pub fn category(&self) -> ResourceCategory {
        ResourceCategory::from_content_type(&self.content_type)
    }

    pub fn is_video(&self) -> bool {
        self.category() == ResourceCategory::Video
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }
}

/// Caller-supplied metadata for an upload, validated before any storage call
#[derive(Debug, Clone)]
pub struct NewMedia {
    owner_id: Uuid,
    keywords: String,
    visibility: Visibility,
    content_type: String,
    size_bytes: i64,
}

impl NewMedia {
    pub fn new(
        owner_id: Option<Uuid>,
        keywords: &str,
        visibility: Visibility,
        content_type: &str,
        size_bytes: usize,
    ) -> MediaResult<Self> {
        let owner_id = owner_id
            .filter(|id| !id.is_nil())
            .ok_or_else(|| MediaError::validation("User ID is missing."))?;

        let keywords = keywords.trim();
        if keywords.is_empty() {
            return Err(MediaError::validation("Keywords are required."));
        }

        let content_type = content_type.trim();
        if content_type.is_empty() {
            return Err(MediaError::validation("Content type is required."));
        }

        let size_bytes = i64::try_from(size_bytes)
            .map_err(|_| MediaError::validation("File is too large."))?;

        Ok(Self {
            owner_id,
            keywords: keywords.to_string(),
            visibility,
            content_type: content_type.to_ascii_lowercase(),
            size_bytes,
        })
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn category(&self) -> ResourceCategory {
        ResourceCategory::from_content_type(&self.content_type)
    }

    /// Bind the metadata to the object the store just wrote
    pub fn into_record(self, storage_key: String, storage_url: String) -> MediaRecord {
        let now = Utc::now();
        MediaRecord {
            id: Uuid::new_v4(),
            owner_id: self.owner_id,
            storage_key,
            storage_url,
            visibility: self.visibility,
            keywords: self.keywords,
            content_type: self.content_type,
            size_bytes: self.size_bytes,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Changes to the mutable fields of a record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaUpdate {
    pub keywords: Option<String>,
    pub visibility: Option<Visibility>,
}

impl MediaUpdate {
    /// Build from raw request fields; blank strings count as absent
    pub fn from_raw(keywords: Option<&str>, visibility: Option<&str>) -> MediaResult<Self> {
        let keywords = keywords
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from);
        let visibility = visibility
            .filter(|v| !v.trim().is_empty())
            .map(Visibility::from_str)
            .transpose()?;

        Ok(Self {
            keywords,
            visibility,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_none() && self.visibility.is_none()
    }

    /// Apply to a record, bumping `updated_at`
    pub fn apply(&self, record: &mut MediaRecord, now: DateTime<Utc>) {
        if let Some(ref keywords) = self.keywords {
            record.keywords = keywords.clone();
        }
        if let Some(visibility) = self.visibility {
            record.visibility = visibility;
        }
        record.updated_at = now;
    }
}
