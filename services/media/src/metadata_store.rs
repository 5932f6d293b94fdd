use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::media::{MediaRecord, MediaUpdate, Visibility};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Filters for listing media, newest first
#[derive(Debug, Clone, Default)]
pub struct MediaQuery {
    /// Filter by owner
    pub owner_id: Option<Uuid>,
    /// Filter by visibility
    pub visibility: Option<Visibility>,
    /// Case-insensitive substring match on keywords
    pub keyword: Option<String>,
    /// Maximum number of results
    pub limit: Option<i64>,
    /// Offset for pagination
    pub offset: Option<i64>,
}

impl MediaQuery {
    /// Whether a record passes the filters (limit and offset aside)
    pub fn matches(&self, record: &MediaRecord) -> bool {
        if let Some(owner_id) = self.owner_id {
            if record.owner_id != owner_id {
                return false;
            }
        }
        if let Some(visibility) = self.visibility {
            if record.visibility != visibility {
                return false;
            }
        }
        if let Some(ref keyword) = self.keyword {
            if !record
                .keywords
                .to_lowercase()
                .contains(&keyword.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

/// Persisted collection of media records
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn insert(&self, record: &MediaRecord) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<MediaRecord>, StoreError>;

    async fn get_by_storage_key(&self, key: &str) -> Result<Option<MediaRecord>, StoreError>;

    /// Records matching the query, ordered by `created_at` then `id`, descending
    async fn query(&self, query: &MediaQuery) -> Result<Vec<MediaRecord>, StoreError>;

    /// Apply an update; `None` when the record does not exist
    async fn update(
        &self,
        id: Uuid,
        update: &MediaUpdate,
    ) -> Result<Option<MediaRecord>, StoreError>;

    /// Delete a record; `false` when it was already gone
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Connectivity check for readiness probes
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, FromRow)]
struct MediaRow {
    id: Uuid,
    owner_id: Uuid,
    storage_key: String,
    storage_url: String,
    visibility: String,
    keywords: String,
    content_type: String,
    size_bytes: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MediaRow> for MediaRecord {
    type Error = StoreError;

    fn try_from(row: MediaRow) -> Result<Self, Self::Error> {
        let visibility = Visibility::from_str(&row.visibility).map_err(|e| StoreError::Corrupt {
            id: row.id,
            reason: e.to_string(),
        })?;

        Ok(MediaRecord {
            id: row.id,
            owner_id: row.owner_id,
            storage_key: row.storage_key,
            storage_url: row.storage_url,
            visibility,
            keywords: row.keywords,
            content_type: row.content_type,
            size_bytes: row.size_bytes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_MEDIA: &str = r#"
    SELECT id, owner_id, storage_key, storage_url, visibility,
           keywords, content_type, size_bytes, created_at, updated_at
    FROM media
"#;

/// Metadata store backed by PostgreSQL
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    /// Create a new metadata store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        info!("Database migrations completed");
        Ok(())
    }
}

/// Escape LIKE wildcards so the keyword matches literally
fn like_pattern(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len() + 2);
    escaped.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn map_insert_error(err: sqlx::Error, key: &str) -> StoreError {
    match err {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            StoreError::DuplicateKey(key.to_string())
        }
        other => StoreError::Database(other),
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    #[instrument(skip(self, record), fields(media_id = %record.id, storage_key = %record.storage_key))]
    async fn insert(&self, record: &MediaRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO media (
                id, owner_id, storage_key, storage_url, visibility,
                keywords, content_type, size_bytes, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8, $9, $10
            )
            "#,
        )
        .bind(record.id)
        .bind(record.owner_id)
        .bind(&record.storage_key)
        .bind(&record.storage_url)
        .bind(record.visibility.as_str())
        .bind(&record.keywords)
        .bind(&record.content_type)
        .bind(record.size_bytes)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, &record.storage_key))?;

        debug!("Media record inserted");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<MediaRecord>, StoreError> {
        let sql = format!("{} WHERE id = $1", SELECT_MEDIA);
        let row = sqlx::query_as::<_, MediaRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(MediaRecord::try_from).transpose()
    }

    async fn get_by_storage_key(&self, key: &str) -> Result<Option<MediaRecord>, StoreError> {
        let sql = format!("{} WHERE storage_key = $1", SELECT_MEDIA);
        let row = sqlx::query_as::<_, MediaRow>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(MediaRecord::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn query(&self, query: &MediaQuery) -> Result<Vec<MediaRecord>, StoreError> {
        let mut sql = format!("{} WHERE 1=1", SELECT_MEDIA);
        let mut param_count = 0;

        if query.owner_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND owner_id = ${}", param_count));
        }

        if query.visibility.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND visibility = ${}", param_count));
        }

        if query.keyword.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND keywords ILIKE ${} ESCAPE '\\'", param_count));
        }

        sql.push_str(" ORDER BY created_at DESC, id DESC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${}", param_count));
        }

        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${}", param_count));
        }

        let mut query_builder = sqlx::query_as::<_, MediaRow>(&sql);

        if let Some(owner_id) = query.owner_id {
            query_builder = query_builder.bind(owner_id);
        }
        if let Some(visibility) = query.visibility {
            query_builder = query_builder.bind(visibility.as_str());
        }
        if let Some(ref keyword) = query.keyword {
            query_builder = query_builder.bind(like_pattern(keyword));
        }
        if let Some(limit) = query.limit {
            query_builder = query_builder.bind(limit);
        }
        if let Some(offset) = query.offset {
            query_builder = query_builder.bind(offset);
        }

        let rows = query_builder.fetch_all(&self.pool).await?;

        rows.into_iter().map(MediaRecord::try_from).collect()
    }

    #[instrument(skip(self, update))]
    async fn update(
        &self,
        id: Uuid,
        update: &MediaUpdate,
    ) -> Result<Option<MediaRecord>, StoreError> {
        let row = sqlx::query_as::<_, MediaRow>(
            r#"
            UPDATE media
            SET keywords = COALESCE($2, keywords),
                visibility = COALESCE($3, visibility),
                updated_at = $4
            WHERE id = $1
            RETURNING id, owner_id, storage_key, storage_url, visibility,
                      keywords, content_type, size_bytes, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(update.keywords.as_deref())
        .bind(update.visibility.map(|v| v.as_str()))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(MediaRecord::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM media WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
