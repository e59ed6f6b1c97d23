//! Boundary to the external media extraction service: metadata resolution
//! plus byte streams for a chosen encoding.

use async_trait::async_trait;
use axum::body::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::resolver::EncodingCandidate;

pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

#[derive(Debug, Clone, Default)]
pub struct VideoMetadata {
    pub title: String,
    pub thumbnail: Option<String>,
    pub candidates: Vec<EncodingCandidate>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("yt-dlp is not installed or not on PATH")]
    MissingBinary,
    #[error("failed to run yt-dlp: {0}")]
    Spawn(std::io::Error),
    #[error("metadata request timed out")]
    Timeout,
    #[error("{0}")]
    Extraction(String),
    #[error("unexpected yt-dlp output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("selected format has no direct media url")]
    MissingStreamUrl,
    #[error("upstream stream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<VideoMetadata, SourceError>;

    async fn open_stream(
        &self,
        url: &str,
        encoding: &EncodingCandidate,
    ) -> Result<ByteStream, SourceError>;
}
