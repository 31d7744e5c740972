use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::document::ExtractorCapabilities;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

pub async fn readiness_check() -> StatusCode {
    // Credential validity is enforced at startup; nothing else to probe.
    StatusCode::OK
}

/// Capability report computed once at startup.
pub async fn capabilities_handler(
    Extension(capabilities): Extension<Arc<ExtractorCapabilities>>,
) -> Json<ExtractorCapabilities> {
    Json(*capabilities)
}
