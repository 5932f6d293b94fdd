//! In-process metadata store.
//!
//! Selected with `database.url = "memory"`; also the store the service
//! and route tests run against.

use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Reverse;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::media::{MediaRecord, MediaUpdate};
use crate::metadata_store::{MediaQuery, MetadataStore};

#[derive(Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<HashMap<Uuid, MediaRecord>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn insert(&self, record: &MediaRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records
            .values()
            .any(|existing| existing.storage_key == record.storage_key)
        {
            return Err(StoreError::DuplicateKey(record.storage_key.clone()));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<MediaRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn get_by_storage_key(&self, key: &str) -> Result<Option<MediaRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|record| record.storage_key == key)
            .cloned())
    }

    async fn query(&self, query: &MediaQuery) -> Result<Vec<MediaRecord>, StoreError> {
        let records = self.records.read().await;
        let mut matching: Vec<MediaRecord> = records
            .values()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();

        matching.sort_by_key(|record| Reverse((record.created_at, record.id)));

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let limit = query.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);

        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn update(
        &self,
        id: Uuid,
        update: &MediaUpdate,
    ) -> Result<Option<MediaRecord>, StoreError> {
        let mut records = self.records.write().await;
        Ok(records.get_mut(&id).map(|record| {
            update.apply(record, Utc::now());
            record.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(&id).is_some())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
