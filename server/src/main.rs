use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::Request,
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer,
};
use tracing::{info, warn};

use server::{config::ServerConfig, router, AppState};
use speech_core::{SpeechEngine, VoiceStore};
use transcribe_core::TranscriptionClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    info!("Starting audio server...");
    let config = ServerConfig::from_env();

    let engine = Arc::new(
        SpeechEngine::new_from_mapfile(&config.model_map_path).unwrap_or_else(|e| {
            warn!(
                "Could not load {}: {e}, starting with no voice models.",
                config.model_map_path
            );
            SpeechEngine::new(std::collections::HashMap::new())
        }),
    );
    engine.preload();
    info!(
        "Voice models configured for {} language(s)",
        engine.configured_languages().len()
    );

    let state = AppState {
        engine,
        voices: Arc::new(VoiceStore::new(config.voice_secret.clone())),
        transcriber: Arc::new(TranscriptionClient::from_env()),
        config: config.clone(),
    };
    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, request_timeout={}s",
        config.port, config.rate_limit_per_minute, config.request_timeout_secs
    );

    // Global rate limit: all requests share one quota regardless of peer.
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(u64::from((config.rate_limit_per_minute / 60).max(1)))
            .burst_size(config.rate_limit_per_minute)
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit configuration"))?,
    );
    info!("Rate limiting: {} requests per minute", config.rate_limit_per_minute);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(cors_layer(&config))
        .into_inner();

    let app = router(state)
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT."))?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    match &config.cors_allowed_origins {
        Some(origins) => {
            let parsed: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect();
            if parsed.is_empty() {
                warn!("CORS_ALLOWED_ORIGINS is empty, falling back to permissive CORS");
                base.allow_origin(tower_http::cors::Any)
            } else {
                info!("CORS configured for {} origin(s)", parsed.len());
                base.allow_origin(AllowOrigin::list(parsed))
            }
        }
        None => {
            warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
            base.allow_origin(tower_http::cors::Any)
        }
    }
}

/// Tag every request and response with an `x-request-id` for tracing.
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert("x-request-id", value.clone());
        let mut response = next.run(request).await;
        response.headers_mut().insert("x-request-id", value);
        response
    } else {
        next.run(request).await
    }
}
