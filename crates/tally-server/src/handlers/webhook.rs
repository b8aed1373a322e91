//! Telegram webhook

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use tracing::{debug, warn};

use tally_core::Update;

use crate::{secrets_match, AppError, AppState, SuccessResponse, TELEGRAM_SECRET_HEADER};

/// POST /telegram/webhook - Receive one Bot API update
///
/// Any authenticated update is acknowledged with 200, even when it carries
/// nothing to handle, so Telegram does not redeliver it.
pub async fn telegram_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SuccessResponse>, AppError> {
    if let Some(expected) = state.config.webhook_secret.as_deref() {
        let provided = headers
            .get(TELEGRAM_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !secrets_match(provided, expected) {
            warn!("Webhook call with a bad secret token");
            return Err(AppError::unauthorized("Invalid secret token"));
        }
    }

    let update: Update = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Malformed webhook update");
        AppError::bad_request("Malformed update")
    })?;

    let update_id = update.update_id;
    match update.into_submission() {
        Some(submission) => state.service.handle(submission).await,
        None => debug!(update_id, "Update without a message ignored"),
    }

    Ok(Json(SuccessResponse { success: true }))
}
