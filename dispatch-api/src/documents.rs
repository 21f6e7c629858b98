use axum::{
    extract::{Extension, Path, State},
    routing::{get, post},
    Json, Router,
};
use dispatch_reservation::DocumentRejection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppJson};
use crate::middleware::Claims;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RejectDocumentRequest {
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct RejectDocumentResponse {
    pub success: bool,
    pub rejection: DocumentRejection,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/documents/{id}/reject", post(reject_document))
        .route("/v1/admin/documents/{id}/rejections", get(rejection_history))
}

async fn reject_document(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(document_id): Path<Uuid>,
    AppJson(req): AppJson<RejectDocumentRequest>,
) -> Result<Json<RejectDocumentResponse>, AppError> {
    let rejection = state.documents.reject(document_id, &req.reason, claims.sub).await?;
    Ok(Json(RejectDocumentResponse {
        success: true,
        rejection,
    }))
}

async fn rejection_history(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<Vec<DocumentRejection>>, AppError> {
    Ok(Json(state.documents.history(document_id).await?))
}
