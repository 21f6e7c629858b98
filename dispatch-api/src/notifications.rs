use axum::{extract::State, routing::post, Json, Router};
use dispatch_reservation::{NotifyOutcome, NotifyRequest};

use crate::error::{AppError, AppJson};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/notifications/send", post(send_notification))
}

/// Synchronous send, for dispatchers re-pushing a ride by hand.
async fn send_notification(
    State(state): State<AppState>,
    AppJson(request): AppJson<NotifyRequest>,
) -> Result<Json<NotifyOutcome>, AppError> {
    if !state.push_breaker.check().await {
        return Err(AppError::Unavailable(format!(
            "{} push delivery is temporarily unavailable",
            state.push_breaker.name
        )));
    }

    match state.notifications.notify_reservation(request).await {
        Ok(outcome) => {
            state.push_breaker.record_success().await;
            Ok(Json(outcome))
        }
        Err(e) => {
            if e.is_transient() {
                state.push_breaker.record_failure().await;
            }
            Err(e.into())
        }
    }
}
