use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Extension, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

use scholar_api_server::config::Settings;
use scholar_api_server::document::ExtractorCapabilities;
use scholar_api_server::handlers;
use scholar_api_server::services::{ConversationService, LlmService};
use scholar_api_server::utils::RetryPolicy;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,scholar_api_server=debug".to_string()),
        )
        .with_target(true)
        .json()
        .init();

    info!("Starting Scholar Assist API server...");

    // Load configuration
    let settings = Settings::load()?;
    info!("Configuration loaded");

    // Missing credential is fatal: refuse to start before binding anything.
    settings.validate_credential()?;
    info!("Provider credential present");

    // Capability report, computed once and logged up front instead of
    // silently degrading later.
    let capabilities = Arc::new(ExtractorCapabilities::detect(settings.vision_enabled()));
    info!("Extractors available: {}", capabilities.summary());

    // Initialize services
    let llm_service = LlmService::new(settings.llm.clone());
    let conversation = Arc::new(ConversationService::new(
        Box::new(llm_service),
        settings.prompts.clone(),
        RetryPolicy::from_config(&settings.retry),
        &settings.session,
    ));

    let app = build_router(conversation, capabilities, settings.upload.max_bytes);

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(
    conversation: Arc<ConversationService>,
    capabilities: Arc<ExtractorCapabilities>,
    max_upload_bytes: usize,
) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check));

    let api_routes = Router::new()
        .route("/api/capabilities", get(handlers::health::capabilities_handler))
        .route("/api/upload", post(handlers::upload::upload_handler))
        .route("/api/ask", post(handlers::chat::ask_handler))
        .route("/api/history", get(handlers::session::history_handler))
        .route(
            "/api/sessions/{session_id}",
            delete(handlers::session::delete_session_handler),
        )
        .layer(Extension(conversation))
        .layer(Extension(capabilities));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        // Single-page UI
        .fallback_service(ServeDir::new("static"))
        // CORS
        .layer(CorsLayer::permissive())
        // Tracing
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        // Body limit (uploads)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
