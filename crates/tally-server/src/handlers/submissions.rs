//! Submission endpoint for transports other than the Telegram webhook

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use tracing::info;

use tally_core::Submission;

use crate::{AppError, AppState, SuccessResponse};

/// POST /api/submissions - Hand one inbound message to the service
///
/// Replies to the sender go through the configured gateway, not this
/// response.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<Submission>,
) -> Result<(StatusCode, Json<SuccessResponse>), AppError> {
    if submission.chat_id == 0 {
        return Err(AppError::bad_request("chat_id is required"));
    }
    if submission.images.is_empty() && submission.text.is_none() {
        return Err(AppError::bad_request("Submission has neither text nor images"));
    }

    info!(
        chat_id = submission.chat_id,
        images = submission.images.len(),
        "Submission received"
    );
    state.service.handle(submission).await;

    Ok((StatusCode::ACCEPTED, Json(SuccessResponse { success: true })))
}
