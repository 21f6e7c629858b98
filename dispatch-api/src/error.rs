use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dispatch_core::{RepoError, ValidationErrors};
use dispatch_reservation::{DocumentError, NotifyError, ReservationError};
use serde_json::json;

/// `Json` extractor whose rejections use the `{success, error}` envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(Debug)]
pub enum AppError {
    Authentication(String),
    Authorization(String),
    Validation(ValidationErrors),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Validation(errors) => {
                let body = Json(json!({
                    "success": false,
                    "errors": errors.errors,
                }));
                return (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
            }
            AppError::Authentication(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Authorization(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "success": false,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(what) => AppError::NotFound(format!("Not found: {}", what)),
            RepoError::Conflict(msg) => AppError::Conflict(msg),
            RepoError::Backend(msg) => AppError::Internal(msg),
        }
    }
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::Validation(errors) => AppError::Validation(errors),
            ReservationError::NotFound(_) => AppError::NotFound(err.to_string()),
            ReservationError::InvalidTransition { .. } | ReservationError::Conflict(_) => {
                AppError::Conflict(err.to_string())
            }
            ReservationError::Forbidden(msg) => AppError::Authorization(msg),
            ReservationError::Repository(e) => e.into(),
        }
    }
}

impl From<NotifyError> for AppError {
    fn from(err: NotifyError) -> Self {
        match err {
            NotifyError::ReservationNotFound(_) => AppError::NotFound(err.to_string()),
            NotifyError::Repository(e) => e.into(),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl From<DocumentError> for AppError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::Validation(errors) => AppError::Validation(errors),
            DocumentError::Repository(e) => e.into(),
        }
    }
}
