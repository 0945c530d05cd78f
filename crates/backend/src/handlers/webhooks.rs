use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use contracts::usecases::u501_webhook_receiver::WebhookRejection;

use crate::shared::app_state::AppState;
use crate::usecases::u501_webhook_receiver::WebhookOutcome;

/// POST /webhooks/platforms/:provider
///
/// The body is taken as raw bytes: the signature covers them exactly.
pub async fn receive(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let outcome = match state.webhooks.receive(&provider, &headers, &body).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // Dedup row not written; a 5xx makes the platform redeliver
            tracing::error!("Webhook from {} could not be recorded: {}", provider, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match outcome {
        WebhookOutcome::UnknownProvider => StatusCode::NOT_FOUND.into_response(),
        WebhookOutcome::InvalidSignature(reason) => (
            StatusCode::UNAUTHORIZED,
            Json(WebhookRejection {
                error: "invalid_signature".to_string(),
                reason,
            }),
        )
            .into_response(),
        other => match other.ack() {
            Some(ack) => (StatusCode::OK, Json(ack)).into_response(),
            None => StatusCode::OK.into_response(),
        },
    }
}
