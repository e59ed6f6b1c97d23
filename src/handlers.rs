use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{
        HeaderMap, HeaderValue,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use url::Url;
use uuid::Uuid;

use crate::{
    error::ApiError,
    history::{DownloadRecord, HistoryStore, NewDownload, StoreError},
    resolver::{self, DownloadKind},
    source::MediaSource,
};

const YOUTUBE_DOMAINS: [&str; 3] = ["youtube.com", "youtu.be", "youtube-nocookie.com"];
const VIDEO_ID_LENGTH: usize = 11;

#[derive(Clone)]
pub struct AppState {
    pub history: Arc<dyn HistoryStore>,
    pub source: Arc<dyn MediaSource>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route(
            "/api/downloads",
            get(list_downloads)
                .post(add_download)
                .delete(clear_downloads),
        )
        .route("/api/downloads/{id}", delete(delete_download))
        .route("/api/download", post(prepare_download))
        .route("/api/stream/audio/{url}/{filename}", get(stream_audio))
        .route("/api/stream/video/{url}/{filename}", get(stream_video))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct DownloadRequest {
    url: String,
    format: DownloadKind,
    quality: Option<String>,
}

#[derive(Debug, Serialize)]
struct DownloadDescriptor {
    success: bool,
    title: String,
    #[serde(rename = "fileSize")]
    file_size: String,
    thumbnail: Option<String>,
    #[serde(rename = "downloadUrl")]
    download_url: String,
    filename: String,
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    quality: Option<String>,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn list_downloads(
    State(state): State<AppState>,
) -> Result<Json<Vec<DownloadRecord>>, ApiError> {
    let records = state
        .history
        .list()
        .await
        .map_err(|error| store_failure(error, "Failed to fetch download history"))?;
    Ok(Json(records))
}

async fn add_download(
    State(state): State<AppState>,
    payload: Result<Json<NewDownload>, JsonRejection>,
) -> Result<Json<DownloadRecord>, ApiError> {
    let Json(new_download) = payload.map_err(|_| ApiError::bad_request("Invalid download data"))?;
    if !new_download.has_required_fields() {
        return Err(ApiError::bad_request("Invalid download data"));
    }

    let record = state
        .history
        .add(new_download)
        .await
        .map_err(|error| store_failure(error, "Failed to add download to history"))?;
    Ok(Json(record))
}

async fn delete_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Ok(parsed) = Uuid::parse_str(id.trim()) {
        state
            .history
            .delete_one(parsed)
            .await
            .map_err(|error| store_failure(error, "Failed to delete download from history"))?;
    }

    Ok(Json(
        serde_json::json!({ "message": "Download removed from history" }),
    ))
}

async fn clear_downloads(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .history
        .clear()
        .await
        .map_err(|error| store_failure(error, "Failed to clear download history"))?;
    Ok(Json(
        serde_json::json!({ "message": "Download history cleared" }),
    ))
}

async fn prepare_download(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Json<DownloadDescriptor>, ApiError> {
    let Json(request) =
        payload.map_err(|_| ApiError::bad_request("Invalid download request"))?;
    let url = request.url.trim();
    if !is_youtube_url(url) {
        return Err(ApiError::bad_request("Invalid YouTube URL"));
    }

    let metadata = state.source.resolve(url).await?;
    let candidate = resolver::select_encoding(
        request.format,
        request.quality.as_deref(),
        &metadata.candidates,
    )?;
    let file_size = resolver::file_size_display(request.format, candidate);
    let filename = resolver::download_filename(&metadata.title, request.format);
    let download_url = stream_path(request.format, url, &filename, request.quality.as_deref());

    Ok(Json(DownloadDescriptor {
        success: true,
        title: metadata.title,
        file_size,
        thumbnail: metadata.thumbnail,
        download_url,
        filename,
    }))
}

async fn stream_audio(
    State(state): State<AppState>,
    Path((url, filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    stream_media(&state, DownloadKind::Audio, &url, &filename, None).await
}

async fn stream_video(
    State(state): State<AppState>,
    Path((url, filename)): Path<(String, String)>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    stream_media(
        &state,
        DownloadKind::Video,
        &url,
        &filename,
        query.quality.as_deref(),
    )
    .await
}

async fn stream_media(
    state: &AppState,
    kind: DownloadKind,
    raw_url: &str,
    filename: &str,
    quality: Option<&str>,
) -> Result<Response, ApiError> {
    let url = urlencoding::decode(raw_url)
        .map_err(|_| ApiError::bad_request("Invalid YouTube URL"))?
        .into_owned();
    if !is_youtube_url(&url) {
        return Err(ApiError::bad_request("Invalid YouTube URL"));
    }

    let metadata = state.source.resolve(&url).await?;
    let candidate = resolver::select_encoding(kind, quality, &metadata.candidates)?;
    let stream = state.source.open_stream(&url, candidate).await?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(kind.content_type()));
    let content_disposition = build_content_disposition(filename);
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition)
            .map_err(|_| ApiError::internal("Failed to build download headers"))?,
    );

    Ok((headers, Body::from_stream(stream)).into_response())
}

fn store_failure(error: StoreError, message: &str) -> ApiError {
    error!("history store operation failed: {error}");
    ApiError::internal(message)
}

fn stream_path(kind: DownloadKind, url: &str, filename: &str, quality: Option<&str>) -> String {
    let segment = match kind {
        DownloadKind::Video => "video",
        DownloadKind::Audio => "audio",
    };
    let mut path = format!(
        "/api/stream/{segment}/{}/{}",
        urlencoding::encode(url),
        urlencoding::encode(filename)
    );
    if kind == DownloadKind::Video
        && let Some(quality) = quality
    {
        path.push_str(&format!("?quality={}", urlencoding::encode(quality)));
    }

    path
}

fn is_youtube_url(input: &str) -> bool {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return false;
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = match Url::parse(&with_scheme) {
        Ok(url) => url,
        Err(_) => return false,
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }

    let host = match parsed.host_str() {
        Some(host) => host.to_ascii_lowercase(),
        None => return false,
    };

    let domain_match = YOUTUBE_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")));

    domain_match && has_video_id(&parsed, &host)
}

fn has_video_id(parsed: &Url, host: &str) -> bool {
    if host == "youtu.be" || host.ends_with(".youtu.be") {
        return parsed
            .path_segments()
            .and_then(|mut segments| segments.find(|segment| !segment.is_empty()))
            .is_some_and(|id| id.len() >= VIDEO_ID_LENGTH);
    }

    if parsed
        .query_pairs()
        .any(|(key, value)| key == "v" && value.len() >= VIDEO_ID_LENGTH)
    {
        return true;
    }

    let mut segments = match parsed.path_segments() {
        Some(segments) => segments,
        None => return false,
    };

    match segments.next() {
        Some("embed") | Some("v") | Some("shorts") | Some("live") => segments
            .next()
            .is_some_and(|id| id.len() >= VIDEO_ID_LENGTH),
        _ => false,
    }
}

fn build_content_disposition(filename: &str) -> String {
    let safe_ascii = sanitize_ascii_filename(filename);
    format!(
        "attachment; filename=\"{safe_ascii}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

fn sanitize_ascii_filename(value: &str) -> String {
    let mut sanitized = String::with_capacity(value.len());

    for character in value.chars() {
        if character.is_ascii_alphanumeric()
            || matches!(character, '.' | '-' | '_' | ' ' | '(' | ')')
        {
            sanitized.push(character);
        } else {
            sanitized.push('_');
        }
    }

    let compact = sanitized.trim();
    if compact.is_empty() {
        "download.bin".to_string()
    } else {
        compact.to_string()
    }
}
