use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_core::{Amount, RepoError};
use dispatch_reservation::models::{FlightStatus, GeoPoint};
use dispatch_reservation::repository::{ReservationFilter, ReservationRepository, StatusChange};
use dispatch_reservation::{Reservation, ReservationStatus};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::backend_error;

pub struct PgReservationRepository {
    pool: PgPool,
}

impl PgReservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    client_name: String,
    pickup_address: String,
    destination: String,
    date: String,
    phone: String,
    flight_number: Option<String>,
    dispatcher: String,
    dispatcher_logo: Option<String>,
    passengers: i32,
    luggage: i32,
    amount_cents: i64,
    driver_amount_cents: i64,
    commission_cents: i64,
    vehicle_type: String,
    payment_type: String,
    status: String,
    driver_id: Option<Uuid>,
    actual_pickup_time: Option<DateTime<Utc>>,
    dropoff_time: Option<DateTime<Utc>>,
    distance: Option<String>,
    duration: Option<String>,
    rating: Option<i16>,
    comment: Option<String>,
    route: Json<Vec<GeoPoint>>,
    pickup_gps: Option<Json<GeoPoint>>,
    destination_gps: Option<Json<GeoPoint>>,
    flight_status: Option<String>,
    placard_text: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = RepoError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = |e: String| RepoError::Backend(format!("reservation {}: {}", id, e));
        let flight_status = row
            .flight_status
            .as_deref()
            .map(str::parse::<FlightStatus>)
            .transpose()
            .map_err(corrupt)?;

        Ok(Reservation {
            id,
            vehicle_type: row.vehicle_type.parse().map_err(corrupt)?,
            payment_type: row.payment_type.parse().map_err(corrupt)?,
            status: row.status.parse().map_err(corrupt)?,
            client_name: row.client_name,
            pickup_address: row.pickup_address,
            destination: row.destination,
            date: row.date,
            phone: row.phone,
            flight_number: row.flight_number,
            dispatcher: row.dispatcher,
            dispatcher_logo: row.dispatcher_logo,
            passengers: row.passengers.max(0) as u32,
            luggage: row.luggage.max(0) as u32,
            amount: Amount::from_cents(row.amount_cents).map_err(|e| corrupt(e.to_string()))?,
            driver_amount: Amount::from_cents(row.driver_amount_cents).map_err(|e| corrupt(e.to_string()))?,
            commission: Amount::from_cents(row.commission_cents).map_err(|e| corrupt(e.to_string()))?,
            driver_id: row.driver_id,
            actual_pickup_time: row.actual_pickup_time,
            dropoff_time: row.dropoff_time,
            distance: row.distance,
            duration: row.duration,
            rating: row.rating.map(|r| r as u8),
            comment: row.comment,
            route: row.route.0,
            pickup_gps: row.pickup_gps.map(|g| g.0),
            destination_gps: row.destination_gps.map(|g| g.0),
            flight_status,
            placard_text: row.placard_text,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl PgReservationRepository {
    /// Tells a lost compare-and-swap apart from a missing row.
    async fn miss(&self, id: Uuid) -> RepoError {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM reservations WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await;
        match exists {
            Ok(true) => RepoError::Conflict(format!("reservation {} changed status concurrently", id)),
            Ok(false) => RepoError::NotFound(id.to_string()),
            Err(e) => backend_error(e),
        }
    }
}

#[async_trait]
impl ReservationRepository for PgReservationRepository {
    async fn insert(&self, r: &Reservation) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO reservations (
                id, client_name, pickup_address, destination, date, phone, flight_number,
                dispatcher, dispatcher_logo, passengers, luggage, amount_cents,
                driver_amount_cents, commission_cents, vehicle_type, payment_type, status,
                driver_id, route, pickup_gps, destination_gps, flight_status, placard_text,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24, $25)
            "#,
        )
        .bind(r.id)
        .bind(&r.client_name)
        .bind(&r.pickup_address)
        .bind(&r.destination)
        .bind(&r.date)
        .bind(&r.phone)
        .bind(&r.flight_number)
        .bind(&r.dispatcher)
        .bind(&r.dispatcher_logo)
        .bind(r.passengers as i32)
        .bind(r.luggage as i32)
        .bind(r.amount.cents())
        .bind(r.driver_amount.cents())
        .bind(r.commission.cents())
        .bind(r.vehicle_type.as_str())
        .bind(r.payment_type.as_str())
        .bind(r.status.as_str())
        .bind(r.driver_id)
        .bind(Json(&r.route))
        .bind(r.pickup_gps.map(Json))
        .bind(r.destination_gps.map(Json))
        .bind(r.flight_status.map(FlightStatus::as_str))
        .bind(&r.placard_text)
        .bind(r.created_at)
        .bind(r.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepoError::Conflict(format!("reservation {} already exists", r.id))
            }
            other => backend_error(other),
        })?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Reservation>, RepoError> {
        let row = sqlx::query_as::<_, ReservationRow>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_error)?;
        row.map(Reservation::try_from).transpose()
    }

    async fn list(&self, filter: ReservationFilter) -> Result<Vec<Reservation>, RepoError> {
        let rows = match filter {
            ReservationFilter::All => {
                sqlx::query_as::<_, ReservationRow>("SELECT * FROM reservations ORDER BY date")
                    .fetch_all(&self.pool)
                    .await
            }
            ReservationFilter::VisibleTo(driver_id) => {
                sqlx::query_as::<_, ReservationRow>(
                    r#"
                    SELECT * FROM reservations
                    WHERE (driver_id = $1 OR (driver_id IS NULL AND status = 'pending'))
                      AND NOT EXISTS (
                          SELECT 1 FROM reservation_declines d
                          WHERE d.reservation_id = reservations.id AND d.driver_id = $1
                      )
                    ORDER BY date
                    "#,
                )
                .bind(driver_id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(backend_error)?;

        rows.into_iter().map(Reservation::try_from).collect()
    }

    async fn apply_status_change(&self, id: Uuid, change: &StatusChange) -> Result<Reservation, RepoError> {
        let details = &change.details;
        let row = sqlx::query_as::<_, ReservationRow>(
            r#"
            UPDATE reservations SET
                status = $1,
                driver_id = COALESCE($2, driver_id),
                actual_pickup_time = COALESCE($3, actual_pickup_time),
                dropoff_time = COALESCE($4, dropoff_time),
                distance = COALESCE($5, distance),
                duration = COALESCE($6, duration),
                rating = COALESCE($7, rating),
                comment = COALESCE($8, comment),
                route = COALESCE($9, route),
                updated_at = NOW()
            WHERE id = $10 AND status = $11
            RETURNING *
            "#,
        )
        .bind(change.status.as_str())
        .bind(change.assign_driver)
        .bind(details.actual_pickup_time)
        .bind(details.dropoff_time)
        .bind(&details.distance)
        .bind(&details.duration)
        .bind(details.rating.map(i16::from))
        .bind(&details.comment)
        .bind(details.route.as_ref().map(Json))
        .bind(id)
        .bind(change.expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.miss(id).await),
        }
    }

    async fn remove(&self, id: Uuid, expected: ReservationStatus) -> Result<Reservation, RepoError> {
        let row = sqlx::query_as::<_, ReservationRow>(
            "DELETE FROM reservations WHERE id = $1 AND status = $2 RETURNING *",
        )
        .bind(id)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.miss(id).await),
        }
    }

    async fn decline(
        &self,
        id: Uuid,
        driver_id: Uuid,
        expected: ReservationStatus,
    ) -> Result<Reservation, RepoError> {
        let mut tx = self.pool.begin().await.map_err(backend_error)?;

        let row = sqlx::query_as::<_, ReservationRow>(
            r#"
            UPDATE reservations SET
                driver_id = CASE WHEN driver_id = $2 THEN NULL ELSE driver_id END,
                updated_at = CASE WHEN driver_id = $2 THEN NOW() ELSE updated_at END
            WHERE id = $1 AND status = $3
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(driver_id)
        .bind(expected.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend_error)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(backend_error)?;
            return Err(self.miss(id).await);
        };

        sqlx::query(
            r#"
            INSERT INTO reservation_declines (reservation_id, driver_id)
            VALUES ($1, $2)
            ON CONFLICT (reservation_id, driver_id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(driver_id)
        .execute(&mut *tx)
        .await
        .map_err(backend_error)?;

        tx.commit().await.map_err(backend_error)?;
        row.try_into()
    }
}
