use std::io::ErrorKind;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use serde::Deserialize;
use tokio::{
    process::Command,
    time::{Duration, timeout},
};
use tracing::{info, warn};

use crate::{
    config::YtDlpConfig,
    resolver::EncodingCandidate,
    source::{ByteStream, MediaSource, SourceError, VideoMetadata},
};

const YT_DLP_TIMEOUT_SECONDS: u64 = 180;

pub struct YtDlpSource {
    config: YtDlpConfig,
    http_client: reqwest::Client,
}

impl YtDlpSource {
    pub fn new(config: YtDlpConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    fn metadata_args(&self, url: &str, with_extra_args: bool) -> Vec<String> {
        let mut args = vec![
            "-J".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
        ];
        if with_extra_args {
            args.extend(self.config.extra_args.iter().cloned());
        }
        args.push(url.to_string());
        args
    }

    async fn fetch_metadata(
        &self,
        url: &str,
        with_extra_args: bool,
    ) -> Result<VideoMetadata, SourceError> {
        let output = self
            .run_yt_dlp(self.metadata_args(url, with_extra_args))
            .await?;
        let info: YtDlpVideoInfo = serde_json::from_slice(&output.stdout)?;
        Ok(metadata_from_info(info))
    }

    async fn run_yt_dlp(&self, args: Vec<String>) -> Result<std::process::Output, SourceError> {
        let command_future = Command::new(&self.config.binary).args(args).output();
        let output = timeout(Duration::from_secs(YT_DLP_TIMEOUT_SECONDS), command_future)
            .await
            .map_err(|_| SourceError::Timeout)?
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    SourceError::MissingBinary
                } else {
                    SourceError::Spawn(error)
                }
            })?;

        if !output.status.success() {
            return Err(SourceError::Extraction(run_error_message(&output.stderr)));
        }

        Ok(output)
    }
}

#[async_trait]
impl MediaSource for YtDlpSource {
    async fn resolve(&self, url: &str) -> Result<VideoMetadata, SourceError> {
        match self.fetch_metadata(url, true).await {
            Ok(metadata) => Ok(metadata),
            Err(error) => {
                warn!("yt-dlp metadata fetch for {url} failed: {error}; retrying once");
                self.fetch_metadata(url, false).await
            }
        }
    }

    async fn open_stream(
        &self,
        url: &str,
        encoding: &EncodingCandidate,
    ) -> Result<ByteStream, SourceError> {
        let stream_url = encoding
            .stream_url
            .as_deref()
            .ok_or(SourceError::MissingStreamUrl)?;
        info!("proxying format {} for {url}", encoding.format_id);

        let response = self
            .http_client
            .get(stream_url)
            .send()
            .await?
            .error_for_status()?;

        Ok(response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed())
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpVideoInfo {
    title: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    format_id: String,
    format_note: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    abr: Option<f32>,
    tbr: Option<f32>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
    url: Option<String>,
}

fn metadata_from_info(info: YtDlpVideoInfo) -> VideoMetadata {
    let approx_duration_ms = info.duration.map(|seconds| (seconds * 1000.0) as u64);
    let candidates = info
        .formats
        .into_iter()
        .filter(|format| has_video(format) || has_audio(format))
        .map(|format| candidate_from_format(format, approx_duration_ms))
        .collect();

    VideoMetadata {
        title: info
            .title
            .and_then(normalize_optional_text)
            .unwrap_or_else(|| "Untitled".to_string()),
        thumbnail: info.thumbnail.and_then(normalize_optional_text),
        candidates,
    }
}

fn candidate_from_format(format: YtDlpFormat, approx_duration_ms: Option<u64>) -> EncodingCandidate {
    let quality_label = format
        .height
        .map(|height| format!("{height}p"))
        .or_else(|| format.format_note.clone());

    EncodingCandidate {
        has_audio: has_audio(&format),
        has_video: has_video(&format),
        quality_label,
        content_length: format
            .filesize
            .or(format.filesize_approx)
            .map(|bytes| bytes as u64),
        approx_duration_ms,
        bitrate_kbps: format.abr.or(format.tbr).map(f64::from),
        height: format.height,
        format_id: format.format_id,
        stream_url: format.url,
    }
}

fn has_video(format: &YtDlpFormat) -> bool {
    matches!(format.vcodec.as_deref(), Some(value) if value != "none")
}

fn has_audio(format: &YtDlpFormat) -> bool {
    matches!(format.acodec.as_deref(), Some(value) if value != "none")
}

fn run_error_message(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp could not complete the request")
        .to_string()
}

fn normalize_optional_text(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_INFO: &str = r#"{
        "title": "  Never Gonna Give You Up  ",
        "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg",
        "duration": 212.0,
        "formats": [
            {"format_id": "sb0", "vcodec": "none", "acodec": "none", "format_note": "storyboard"},
            {"format_id": "140", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.5,
             "filesize": 3433514, "url": "https://cdn.example/audio"},
            {"format_id": "136", "vcodec": "avc1.4d401f", "acodec": "none", "height": 720,
             "tbr": 1500.0, "filesize_approx": 40000000.0, "url": "https://cdn.example/v720"},
            {"format_id": "22", "vcodec": "avc1.64001F", "acodec": "mp4a.40.2", "height": 720,
             "format_note": "720p", "url": "https://cdn.example/muxed"}
        ]
    }"#;

    fn source_with_args(extra_args: &[&str]) -> YtDlpSource {
        let config = YtDlpConfig {
            binary: "yt-dlp".to_string(),
            extra_args: extra_args.iter().map(ToString::to_string).collect(),
        };
        YtDlpSource::new(config, reqwest::Client::new())
    }

    #[test]
    fn test_metadata_args_include_extras_only_on_first_attempt() {
        let source = source_with_args(&["--extractor-args", "youtube:player_client=android"]);
        let url = "https://youtu.be/dQw4w9WgXcQ";

        let first = source.metadata_args(url, true);
        assert_eq!(
            first,
            vec![
                "-J",
                "--no-playlist",
                "--no-warnings",
                "--extractor-args",
                "youtube:player_client=android",
                url,
            ]
        );

        let retry = source.metadata_args(url, false);
        assert_eq!(retry, vec!["-J", "--no-playlist", "--no-warnings", url]);
    }

    #[test]
    fn test_metadata_mapping_drops_formats_without_streams() {
        let info: YtDlpVideoInfo = serde_json::from_str(SAMPLE_INFO).unwrap();
        let metadata = metadata_from_info(info);

        assert_eq!(metadata.title, "Never Gonna Give You Up");
        assert_eq!(metadata.candidates.len(), 3);
        assert!(
            metadata
                .candidates
                .iter()
                .all(|candidate| candidate.format_id != "sb0")
        );
    }

    #[test]
    fn test_metadata_mapping_fills_candidate_fields() {
        let info: YtDlpVideoInfo = serde_json::from_str(SAMPLE_INFO).unwrap();
        let metadata = metadata_from_info(info);

        let audio = &metadata.candidates[0];
        assert_eq!(audio.format_id, "140");
        assert!(audio.has_audio && !audio.has_video);
        assert_eq!(audio.bitrate_kbps, Some(129.5));
        assert_eq!(audio.content_length, Some(3_433_514));
        assert_eq!(audio.approx_duration_ms, Some(212_000));
        assert_eq!(audio.quality_label, None);

        let video = &metadata.candidates[1];
        assert_eq!(video.quality_label.as_deref(), Some("720p"));
        assert_eq!(video.content_length, Some(40_000_000));
        assert_eq!(video.bitrate_kbps, Some(1500.0));

        let muxed = &metadata.candidates[2];
        assert!(muxed.has_audio && muxed.has_video);
        assert_eq!(muxed.content_length, None);
        assert_eq!(muxed.stream_url.as_deref(), Some("https://cdn.example/muxed"));
    }

    #[test]
    fn test_title_falls_back_to_untitled() {
        let info: YtDlpVideoInfo =
            serde_json::from_str(r#"{"title": "   ", "formats": []}"#).unwrap();
        assert_eq!(metadata_from_info(info).title, "Untitled");
    }

    #[test]
    fn test_run_error_message_takes_last_stderr_line() {
        let stderr = b"WARNING: something minor\nERROR: Video unavailable\n\n";
        assert_eq!(run_error_message(stderr), "ERROR: Video unavailable");
        assert_eq!(
            run_error_message(b""),
            "yt-dlp could not complete the request"
        );
    }
}
