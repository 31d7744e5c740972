use axum::{extract::Extension, Json};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::sync::Arc;
use tracing::{error, info};

use crate::document::{DocumentKind, ExtractorCapabilities};
use crate::models::chat::{AskRequest, AskResponse, ImageUpload};
use crate::services::{ConversationService, ProviderError};
use crate::utils::error::ApiError;

pub async fn ask_handler(
    Extension(conversation): Extension<Arc<ConversationService>>,
    Extension(capabilities): Extension<Arc<ExtractorCapabilities>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }

    let session_id = request
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let image_data_uri = match &request.image {
        Some(image) => {
            if !capabilities.vision {
                return Err(ApiError::BadRequest(
                    "Image questions are not enabled on this server.".to_string(),
                ));
            }
            Some(image_to_data_uri(image)?)
        }
        None => None,
    };

    info!(
        "Ask: session={}, message_len={}, has_image={}",
        session_id,
        request.message.len(),
        image_data_uri.is_some()
    );

    let outcome = conversation
        .ask(&session_id, &request.message, image_data_uri)
        .await
        .map_err(|e| {
            error!("Chat turn failed for session {}: {}", session_id, e);
            match e {
                ProviderError::RateLimited => ApiError::ProviderBusy(
                    "The assistant is handling too many requests right now. Please try again in a moment."
                        .to_string(),
                ),
                _ => ApiError::ProviderBusy(
                    "The assistant is busy right now. Please try again.".to_string(),
                ),
            }
        })?;

    Ok(Json(AskResponse {
        session_id,
        reply: outcome.reply,
        turns: outcome.total_turns,
        timestamp: chrono::Utc::now(),
    }))
}

/// Validates the inline image payload and re-embeds it as a data URI.
/// Only JPEG and PNG are accepted; the bytes are never text-extracted.
fn image_to_data_uri(image: &ImageUpload) -> Result<String, ApiError> {
    let payload = image.data_base64.trim();
    let bytes = BASE64
        .decode(payload)
        .map_err(|e| ApiError::BadRequest(format!("Invalid base64 image payload: {}", e)))?;

    let kind = DocumentKind::detect(&image.file_name, &bytes)
        .filter(DocumentKind::is_image)
        .ok_or_else(|| {
            ApiError::BadRequest("Only JPEG and PNG images are supported.".to_string())
        })?;

    Ok(format!("data:{};base64,{}", kind.mime(), payload))
}
