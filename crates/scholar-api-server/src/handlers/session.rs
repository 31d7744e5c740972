use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::models::chat::HistoryResponse;
use crate::services::ConversationService;
use crate::utils::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub session_id: String,
}

/// Ordered message log, oldest first. The UI reverses it for newest-first
/// display; that is presentation, not data-model ordering.
pub async fn history_handler(
    Extension(conversation): Extension<Arc<ConversationService>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let messages = conversation
        .history(&query.session_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Unknown session: {}", query.session_id)))?;

    Ok(Json(HistoryResponse {
        session_id: query.session_id,
        messages,
    }))
}

pub async fn delete_session_handler(
    Extension(conversation): Extension<Arc<ConversationService>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if conversation.end_session(&session_id) {
        info!("Session {} ended", session_id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Unknown session: {}", session_id)))
    }
}
