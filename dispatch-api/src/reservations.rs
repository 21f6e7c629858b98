use axum::{
    body::Bytes,
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use dispatch_reservation::lifecycle::available_actions;
use dispatch_reservation::{
    CompletionReport, NewReservation, Reservation, ReservationBuckets, RideAction, StatusUpdate,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppJson};
use crate::middleware::Claims;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub success: bool,
    pub reservation: Reservation,
    /// Next actions the lifecycle allows from the returned status.
    pub actions: Vec<RideAction>,
    pub message: String,
}

impl ReservationResponse {
    fn ok(reservation: Reservation, message: &str) -> Json<Self> {
        let actions = available_actions(reservation.status);
        Json(Self {
            success: true,
            reservation,
            actions,
            message: message.to_string(),
        })
    }

    /// The caller can no longer act on the reservation.
    fn closed(reservation: Reservation, message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            reservation,
            actions: Vec::new(),
            message: message.to_string(),
        })
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/reservations", post(create_reservation).get(list_reservations))
        .route("/v1/reservations/status", post(set_status))
        .route("/v1/reservations/{id}", get(get_reservation))
        .route("/v1/reservations/{id}/accept", post(accept))
        .route("/v1/reservations/{id}/reject", post(reject))
        .route("/v1/reservations/{id}/start", post(start_ride))
        .route("/v1/reservations/{id}/arrive", post(arrived))
        .route("/v1/reservations/{id}/board", post(client_boarded))
        .route("/v1/reservations/{id}/complete", post(complete))
}

async fn create_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<NewReservation>,
) -> Result<(StatusCode, Json<ReservationResponse>), AppError> {
    claims.require_admin()?;
    let reservation = state.reservations.create(payload).await?;
    Ok((
        StatusCode::CREATED,
        ReservationResponse::ok(reservation, "Reservation created"),
    ))
}

async fn list_reservations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ReservationBuckets>, AppError> {
    Ok(Json(state.reservations.buckets(&claims.actor()).await?))
}

async fn get_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, AppError> {
    Ok(Json(state.reservations.get(&claims.actor(), id).await?))
}

async fn accept(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    let reservation = state.reservations.accept(&claims.actor(), id).await?;
    Ok(ReservationResponse::ok(reservation, "Reservation accepted"))
}

async fn reject(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    let reservation = state.reservations.reject(&claims.actor(), id).await?;
    Ok(ReservationResponse::closed(reservation, "Reservation rejected"))
}

async fn start_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    let reservation = state.reservations.start_ride(&claims.actor(), id).await?;
    Ok(ReservationResponse::ok(reservation, "Ride started"))
}

async fn arrived(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    let reservation = state.reservations.arrived(&claims.actor(), id).await?;
    Ok(ReservationResponse::ok(reservation, "Arrived at pickup"))
}

async fn client_boarded(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    let reservation = state.reservations.client_boarded(&claims.actor(), id).await?;
    Ok(ReservationResponse::ok(reservation, "Client on board"))
}

/// Body is optional; an empty POST completes without a report.
async fn complete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ReservationResponse>, AppError> {
    let report = if body.is_empty() {
        CompletionReport::default()
    } else {
        serde_json::from_slice::<CompletionReport>(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid completion report: {}", e)))?
    };
    let reservation = state.reservations.complete(&claims.actor(), id, report).await?;
    Ok(ReservationResponse::ok(reservation, "Ride completed"))
}

async fn set_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppJson(update): AppJson<StatusUpdate>,
) -> Result<Json<ReservationResponse>, AppError> {
    let reservation = state.reservations.set_status(&claims.actor(), update).await?;
    Ok(ReservationResponse::ok(reservation, "Status updated"))
}
