use std::{collections::HashSet, sync::Arc};

use axum::http::{HeaderValue, Method, header::CONTENT_DISPOSITION};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub allowed_origins: Vec<String>,
    pub ytdlp: YtDlpConfig,
}

#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    pub binary: String,
    pub extra_args: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: resolve_bind_addr(),
            allowed_origins: read_origins_env(),
            ytdlp: YtDlpConfig::from_env(),
        }
    }
}

impl YtDlpConfig {
    pub fn from_env() -> Self {
        let binary = std::env::var("YTDLP_PATH")
            .ok()
            .and_then(|value| non_empty(&value).map(ToString::to_string))
            .unwrap_or_else(|| "yt-dlp".to_string());
        let extra_args = std::env::var("YTDLP_EXTRA_ARGS")
            .ok()
            .map(|value| value.split_whitespace().map(ToString::to_string).collect())
            .unwrap_or_default();

        Self { binary, extra_args }
    }
}

fn resolve_bind_addr() -> String {
    if let Some(configured) = std::env::var("APP_ADDR")
        .ok()
        .and_then(|value| non_empty(&value).map(ToString::to_string))
    {
        return configured;
    }

    if let Some(port) = std::env::var("PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
    {
        return format!("0.0.0.0:{port}");
    }

    "127.0.0.1:8787".to_string()
}

fn read_origins_env() -> Vec<String> {
    std::env::var("ALLOWED_ORIGINS")
        .ok()
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn build_cors_layer(allowed_origins: &[String]) -> Result<CorsLayer, ApiError> {
    if allowed_origins.is_empty() || allowed_origins.iter().any(|origin| origin == "*") {
        warn!("ALLOWED_ORIGINS not configured; allowing any origin");
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers(Any)
            .expose_headers([CONTENT_DISPOSITION]));
    }

    let normalized_origins = allowed_origins
        .iter()
        .map(|origin| {
            normalize_origin(origin).ok_or_else(|| {
                ApiError::internal(format!(
                    "Invalid origin in ALLOWED_ORIGINS: {origin}. Use values like https://example.com"
                ))
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;
    let allowed = Arc::new(normalized_origins);
    let allow_origin = AllowOrigin::predicate({
        let allowed = Arc::clone(&allowed);
        move |origin: &HeaderValue, _| {
            let normalized = origin.to_str().ok().and_then(normalize_origin);
            let matched = normalized
                .as_ref()
                .is_some_and(|value| allowed.contains(value));
            debug!(
                "CORS origin check raw={:?} normalized={:?} allowed={}",
                origin, normalized, matched
            );
            matched
        }
    });
    info!("CORS allow-list active with {} origin(s)", allowed.len());

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
        .expose_headers([CONTENT_DISPOSITION]))
}

fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };
    let port = parsed.port();

    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    let include_port = port.is_some_and(|explicit| explicit != default_port);

    if include_port {
        Some(format!("{scheme}://{host}:{}", port?))
    } else {
        Some(format!("{scheme}://{host}"))
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}
