use axum::{
    extract::{multipart::MultipartError, Extension, Multipart},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::document::{DocumentKind, DocumentParser};
use crate::models::chat::{UploadResponse, UploadStatus};
use crate::services::ConversationService;
use crate::utils::error::ApiError;

/// Accepts one artifact per request. Recognized document kinds replace the
/// session's context blob; unrecognized kinds (and images, which belong on
/// the ask request) are ignored without touching the session.
pub async fn upload_handler(
    Extension(conversation): Extension<Arc<ConversationService>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut session_id: Option<String> = None;
    let mut file_data: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "session_id" => {
                session_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("Invalid session_id: {}", e)))?,
                );
            }
            "file" => {
                filename = field.file_name().map(|s| s.to_string());
                file_data = Some(field.bytes().await.map_err(file_read_error)?.to_vec());
            }
            _ => {}
        }
    }

    let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let file_data = file_data.ok_or_else(|| ApiError::BadRequest("file required".to_string()))?;
    let filename = filename.unwrap_or_default();

    info!(
        "Upload for session {}: {} ({} bytes)",
        session_id,
        filename,
        file_data.len()
    );

    let Some(kind) = DocumentKind::detect(&filename, &file_data) else {
        info!("Unrecognized upload kind for {}, ignoring", filename);
        return Ok(Json(UploadResponse {
            session_id,
            status: UploadStatus::Ignored,
            kind: None,
            chars_extracted: 0,
            message: "Unsupported file type; no document context was set.".to_string(),
        }));
    };

    if kind.is_image() {
        return Ok(Json(UploadResponse {
            session_id,
            status: UploadStatus::Ignored,
            kind: Some(kind.label().to_string()),
            chars_extracted: 0,
            message: "Images are not used as document context; attach them to a question instead."
                .to_string(),
        }));
    }

    // A failed extraction degrades to the sentinel blob rather than failing
    // the session; the session always has a defined context afterwards.
    let extracted = match DocumentParser::extract(kind, &file_data) {
        Ok(text) => text,
        Err(e) => {
            warn!("Extraction failed for {}: {}", filename, e);
            String::new()
        }
    };

    let chars_extracted = extracted.trim().len();
    let status = if chars_extracted == 0 {
        UploadStatus::Empty
    } else {
        UploadStatus::Extracted
    };

    conversation.set_context(&session_id, extracted).await;

    let message = match status {
        UploadStatus::Extracted => "File uploaded and text extracted successfully.".to_string(),
        _ => "File uploaded, but no readable text was found.".to_string(),
    };

    Ok(Json(UploadResponse {
        session_id,
        status,
        kind: Some(kind.label().to_string()),
        chars_extracted,
        message,
    }))
}

/// A body that blows the configured upload limit is a 413, not a 400.
fn file_read_error(e: MultipartError) -> ApiError {
    classify_read_failure(e.status(), &e.to_string())
}

fn classify_read_failure(status: StatusCode, detail: &str) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Uploaded file exceeds the size limit.".to_string())
    } else {
        ApiError::BadRequest(format!("Failed to read file: {}", detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_limit_reads_map_to_payload_too_large() {
        assert!(matches!(
            classify_read_failure(StatusCode::PAYLOAD_TOO_LARGE, "length limit exceeded"),
            ApiError::PayloadTooLarge(_)
        ));
        assert!(matches!(
            classify_read_failure(StatusCode::BAD_REQUEST, "truncated field"),
            ApiError::BadRequest(_)
        ));
    }
}
