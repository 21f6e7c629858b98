use axum::{
    extract::{Extension, State},
    routing::put,
    Json, Router,
};
use dispatch_core::repository::DeviceToken;
use dispatch_core::validation::validate_string;
use dispatch_core::ValidationErrors;
use dispatch_shared::Masked;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppJson};
use crate::middleware::Claims;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterTokenRequest {
    pub token: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/devices/token", put(register_token).delete(unregister_token))
}

async fn register_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppJson(req): AppJson<RegisterTokenRequest>,
) -> Result<Json<DeviceToken>, AppError> {
    ValidationErrors::collect([validate_string(Some(req.token.as_str()), "token", 4096, true)])?;

    let device = state.devices.upsert(claims.sub, req.token.trim()).await?;
    tracing::info!("Registered device token {} for {}", Masked(device.token.as_str()), claims.sub);
    Ok(Json(device))
}

async fn unregister_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, AppError> {
    let removed = state.devices.remove(claims.sub).await?;
    Ok(Json(json!({ "success": true, "removed": removed })))
}
