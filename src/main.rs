mod config;
mod error;
mod handlers;
mod history;
mod resolver;
mod source;
mod ytdlp;

use std::sync::Arc;

use tokio::{net::TcpListener, time::Duration};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    config::{AppConfig, build_cors_layer},
    error::ApiError,
    handlers::{AppState, router},
    history::MemoryHistoryStore,
    ytdlp::YtDlpSource,
};

const CONNECT_TIMEOUT_SECONDS: u64 = 10;
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "tubedl=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let config = AppConfig::from_env();

    // Connect timeout only; a global request timeout would cut off long streams.
    let http_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECONDS))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|error| ApiError::internal(format!("Failed to build HTTP client: {error}")))?;

    let state = AppState {
        history: Arc::new(MemoryHistoryStore::new()),
        source: Arc::new(YtDlpSource::new(config.ytdlp.clone(), http_client)),
    };

    let cors = build_cors_layer(&config.allowed_origins)?;
    let app = router(state).layer(TraceLayer::new_for_http()).layer(cors);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|error| {
            ApiError::internal(format!("Failed to bind {}: {error}", config.bind_addr))
        })?;

    info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}
