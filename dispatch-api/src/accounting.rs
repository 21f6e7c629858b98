use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dispatch_reservation::accounting::{AccountingSummary, RecordOutcome};
use dispatch_reservation::{AccountingTransaction, NewTransaction};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppJson};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub success: bool,
    pub transaction: AccountingTransaction,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    pub reservation_id: Option<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/accounting/transactions", post(record_transaction).get(list_transactions))
        .route("/v1/accounting/summary", get(summary))
}

/// Bad input here is a plain 400 with the first message, not the 422 list.
async fn record_transaction(
    State(state): State<AppState>,
    AppJson(payload): AppJson<NewTransaction>,
) -> Result<Response, AppError> {
    let transaction = match payload.into_transaction() {
        Ok(tx) => tx,
        Err(errors) => {
            let message = errors.first_message().unwrap_or("Invalid transaction").to_string();
            return Err(AppError::BadRequest(message));
        }
    };

    let response = match state.accounting.record(&transaction).await? {
        RecordOutcome::Inserted(tx) => (
            StatusCode::CREATED,
            Json(TransactionResponse {
                success: true,
                transaction: tx,
                message: "Transaction recorded".to_string(),
            }),
        ),
        RecordOutcome::Duplicate(tx) => (
            StatusCode::OK,
            Json(TransactionResponse {
                success: true,
                transaction: tx,
                message: "Transaction already recorded".to_string(),
            }),
        ),
    };
    Ok(response.into_response())
}

async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let transactions = state.accounting.list(query.reservation_id).await?;
    Ok(Json(json!({
        "success": true,
        "transactions": transactions,
    })))
}

async fn summary(State(state): State<AppState>) -> Result<Json<AccountingSummary>, AppError> {
    Ok(Json(state.accounting.summary().await?))
}
