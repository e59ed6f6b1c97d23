use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    #[default]
    Completed,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "url")]
    pub source_url: String,
    pub format: String,
    pub quality: Option<String>,
    #[serde(rename = "fileSize")]
    pub file_size_display: Option<String>,
    #[serde(rename = "thumbnail")]
    pub thumbnail_url: Option<String>,
    pub status: DownloadStatus,
    pub downloaded_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewDownload {
    pub title: String,
    pub url: String,
    pub format: String,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub file_size: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub status: DownloadStatus,
}

impl NewDownload {
    pub fn has_required_fields(&self) -> bool {
        !self.title.trim().is_empty()
            && !self.url.trim().is_empty()
            && !self.format.trim().is_empty()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("history store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn list(&self) -> Result<Vec<DownloadRecord>, StoreError>;
    async fn add(&self, new_download: NewDownload) -> Result<DownloadRecord, StoreError>;
    async fn delete_one(&self, id: Uuid) -> Result<(), StoreError>;
    async fn clear(&self) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryHistoryStore {
    records: Mutex<HashMap<Uuid, DownloadRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn list(&self) -> Result<Vec<DownloadRecord>, StoreError> {
        let records = self.records.lock().await;
        let mut entries = records.values().cloned().collect::<Vec<_>>();
        sort_newest_first(&mut entries);
        Ok(entries)
    }

    async fn add(&self, new_download: NewDownload) -> Result<DownloadRecord, StoreError> {
        let record = DownloadRecord {
            id: Uuid::new_v4(),
            title: new_download.title,
            source_url: new_download.url,
            format: new_download.format,
            quality: new_download.quality,
            file_size_display: new_download.file_size,
            thumbnail_url: new_download.thumbnail,
            status: new_download.status,
            downloaded_at: Utc::now(),
        };

        self.records.lock().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn delete_one(&self, id: Uuid) -> Result<(), StoreError> {
        self.records.lock().await.remove(&id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.records.lock().await.clear();
        Ok(())
    }
}

// Map iteration order is unspecified, so listing sorts every call; equal
// timestamps fall back to the id to keep the order stable.
fn sort_newest_first(records: &mut [DownloadRecord]) {
    records.sort_by(|a, b| {
        b.downloaded_at
            .cmp(&a.downloaded_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
