use std::cmp::Ordering;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SIZE_PENDING: &str = "Calculating...";

const MAX_FILENAME_STEM_CHARS: usize = 100;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DownloadKind {
    Video,
    Audio,
}

impl DownloadKind {
    pub fn extension(self) -> &'static str {
        match self {
            DownloadKind::Video => "mp4",
            DownloadKind::Audio => "mp3",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            DownloadKind::Video => "video/mp4",
            DownloadKind::Audio => "audio/mpeg",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodingCandidate {
    pub format_id: String,
    pub quality_label: Option<String>,
    pub has_audio: bool,
    pub has_video: bool,
    pub content_length: Option<u64>,
    pub approx_duration_ms: Option<u64>,
    pub bitrate_kbps: Option<f64>,
    pub height: Option<u32>,
    pub stream_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no encodings available for this video")]
    NoEncodings,
}

#[derive(Debug, Clone, Copy)]
enum FallbackStep {
    Label(&'static str),
    Highest,
    Lowest,
}

const FALLBACK_4K: &[FallbackStep] = &[
    FallbackStep::Label("1440p"),
    FallbackStep::Label("1080p"),
    FallbackStep::Highest,
];
const FALLBACK_1080P: &[FallbackStep] = &[FallbackStep::Label("720p"), FallbackStep::Highest];
const FALLBACK_720P: &[FallbackStep] = &[FallbackStep::Label("480p"), FallbackStep::Highest];
const FALLBACK_480P: &[FallbackStep] = &[FallbackStep::Label("360p"), FallbackStep::Highest];
const FALLBACK_360P: &[FallbackStep] = &[FallbackStep::Lowest];
const FALLBACK_DEFAULT: &[FallbackStep] = &[FallbackStep::Highest];

fn quality_plan(token: Option<&str>) -> (Option<&'static str>, &'static [FallbackStep]) {
    let normalized = token.map(|value| value.trim().to_ascii_lowercase());
    match normalized.as_deref() {
        Some("4k") => (Some("2160p"), FALLBACK_4K),
        Some("1080p") => (Some("1080p"), FALLBACK_1080P),
        Some("720p") => (Some("720p"), FALLBACK_720P),
        Some("480p") => (Some("480p"), FALLBACK_480P),
        Some("360p") => (Some("360p"), FALLBACK_360P),
        _ => (None, FALLBACK_DEFAULT),
    }
}

pub fn select_encoding<'a>(
    kind: DownloadKind,
    quality: Option<&str>,
    candidates: &'a [EncodingCandidate],
) -> Result<&'a EncodingCandidate, ResolveError> {
    if candidates.is_empty() {
        return Err(ResolveError::NoEncodings);
    }

    let selected = match kind {
        DownloadKind::Video => select_video(quality, candidates),
        DownloadKind::Audio => select_audio(candidates),
    };

    Ok(selected.unwrap_or(&candidates[0]))
}

fn select_video<'a>(
    quality: Option<&str>,
    candidates: &'a [EncodingCandidate],
) -> Option<&'a EncodingCandidate> {
    let playable = candidates
        .iter()
        .filter(|candidate| candidate.has_video && candidate.has_audio)
        .collect::<Vec<_>>();

    let (exact, fallbacks) = quality_plan(quality);
    if let Some(target) = exact
        && let Some(found) = find_label(&playable, target)
    {
        return Some(found);
    }

    for step in fallbacks {
        let found = match step {
            FallbackStep::Label(label) => find_label(&playable, label),
            FallbackStep::Highest => extreme_by_height(&playable, Ordering::Greater),
            FallbackStep::Lowest => extreme_by_height(&playable, Ordering::Less),
        };
        if found.is_some() {
            return found;
        }
    }

    None
}

fn select_audio(candidates: &[EncodingCandidate]) -> Option<&EncodingCandidate> {
    let audio_only = candidates
        .iter()
        .filter(|candidate| candidate.has_audio && !candidate.has_video)
        .collect::<Vec<_>>();

    let mut best: Option<(&EncodingCandidate, f64)> = None;
    for candidate in &audio_only {
        let Some(bitrate) = candidate.bitrate_kbps else {
            continue;
        };
        let replace = match best {
            Some((_, best_bitrate)) => bitrate > best_bitrate,
            None => true,
        };
        if replace {
            best = Some((candidate, bitrate));
        }
    }

    best.map(|(candidate, _)| candidate)
        .or_else(|| audio_only.first().copied())
}

fn find_label<'a>(
    candidates: &[&'a EncodingCandidate],
    label: &str,
) -> Option<&'a EncodingCandidate> {
    candidates
        .iter()
        .find(|candidate| candidate.quality_label.as_deref() == Some(label))
        .copied()
}

// Ties keep the first-seen candidate, so selection is stable for equal heights.
fn extreme_by_height<'a>(
    candidates: &[&'a EncodingCandidate],
    preference: Ordering,
) -> Option<&'a EncodingCandidate> {
    let mut best: Option<(&'a EncodingCandidate, u32)> = None;
    for candidate in candidates {
        let Some(height) = candidate.height else {
            continue;
        };
        let replace = match best {
            Some((_, best_height)) => height.cmp(&best_height) == preference,
            None => true,
        };
        if replace {
            best = Some((candidate, height));
        }
    }

    best.map(|(candidate, _)| candidate)
}

pub fn file_size_display(kind: DownloadKind, candidate: &EncodingCandidate) -> String {
    if let Some(bytes) = candidate.content_length {
        let mb = bytes as f64 / 1_048_576.0;
        return format!("{mb:.1} MB");
    }

    let bitrate_kbps = match kind {
        DownloadKind::Audio => candidate.bitrate_kbps,
        DownloadKind::Video => candidate.height.map(video_bitrate_kbps),
    };

    match (candidate.approx_duration_ms, bitrate_kbps) {
        (Some(duration_ms), Some(bitrate)) => {
            let megabytes = duration_ms as f64 * bitrate / 8.0 / 1_000_000.0;
            format!("{megabytes:.1} MB (est.)")
        }
        _ => SIZE_PENDING.to_string(),
    }
}

fn video_bitrate_kbps(height: u32) -> f64 {
    if height >= 1080 {
        8000.0
    } else if height >= 720 {
        5000.0
    } else if height >= 480 {
        2500.0
    } else {
        1000.0
    }
}

pub fn sanitize_title(title: &str) -> String {
    let mut stem = String::with_capacity(title.len());
    let mut pending_separator = false;

    for character in title.chars() {
        if character.is_whitespace() {
            pending_separator = !stem.is_empty();
        } else if character.is_alphanumeric() || character == '-' {
            if pending_separator {
                stem.push('_');
                pending_separator = false;
            }
            stem.push(character);
        }
    }

    stem.chars().take(MAX_FILENAME_STEM_CHARS).collect()
}

pub fn download_filename(title: &str, kind: DownloadKind) -> String {
    let stem = sanitize_title(title);
    let stem = if stem.is_empty() {
        "download".to_string()
    } else {
        stem
    };

    format!(
        "{stem}_{}.{}",
        Utc::now().timestamp_millis(),
        kind.extension()
    )
}
