use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_core::RepoError;
use uuid::Uuid;

use crate::accounting::{AccountingTransaction, RecordOutcome};
use crate::documents::DocumentRejection;
use crate::models::{GeoPoint, Reservation, ReservationStatus};

/// Post-ride details merged into the record alongside a status change.
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RideDetails {
    pub actual_pickup_time: Option<DateTime<Utc>>,
    pub dropoff_time: Option<DateTime<Utc>>,
    pub distance: Option<String>,
    pub duration: Option<String>,
    pub rating: Option<u8>,
    pub comment: Option<String>,
    pub route: Option<Vec<GeoPoint>>,
}

impl RideDetails {
    pub fn apply_to(&self, reservation: &mut Reservation) {
        if let Some(t) = self.actual_pickup_time {
            reservation.actual_pickup_time = Some(t);
        }
        if let Some(t) = self.dropoff_time {
            reservation.dropoff_time = Some(t);
        }
        if let Some(d) = &self.distance {
            reservation.distance = Some(d.clone());
        }
        if let Some(d) = &self.duration {
            reservation.duration = Some(d.clone());
        }
        if let Some(r) = self.rating {
            reservation.rating = Some(r);
        }
        if let Some(c) = &self.comment {
            reservation.comment = Some(c.clone());
        }
        if let Some(route) = &self.route {
            reservation.route = route.clone();
        }
    }
}

/// A guarded status write: applied only while the stored status still equals
/// `expected`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub expected: ReservationStatus,
    pub status: ReservationStatus,
    pub assign_driver: Option<Uuid>,
    pub details: RideDetails,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationFilter {
    All,
    /// Assigned to the driver, or unassigned and pending, minus the rides
    /// the driver declined.
    VisibleTo(Uuid),
}

/// Authoritative reservation store
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn insert(&self, reservation: &Reservation) -> Result<(), RepoError>;

    async fn get(&self, id: Uuid) -> Result<Option<Reservation>, RepoError>;

    async fn list(&self, filter: ReservationFilter) -> Result<Vec<Reservation>, RepoError>;

    /// Compare-and-swap on status. `Conflict` when the stored status is no
    /// longer `change.expected`, `NotFound` when the id is unknown.
    async fn apply_status_change(
        &self,
        id: Uuid,
        change: &StatusChange,
    ) -> Result<Reservation, RepoError>;

    /// Delete the reservation if it is still in `expected` status.
    async fn remove(&self, id: Uuid, expected: ReservationStatus) -> Result<Reservation, RepoError>;

    /// Hide the reservation from `driver_id` while it stays in `expected`
    /// status. A driver declining their own assignment releases it.
    async fn decline(
        &self,
        id: Uuid,
        driver_id: Uuid,
        expected: ReservationStatus,
    ) -> Result<Reservation, RepoError>;
}

/// Financial transaction ledger
#[async_trait]
pub trait AccountingRepository: Send + Sync {
    /// Inserts the record; a record whose `external_ref` already exists is
    /// returned as `Duplicate` instead.
    async fn record(&self, transaction: &AccountingTransaction) -> Result<RecordOutcome, RepoError>;

    async fn list(&self, reservation_id: Option<Uuid>) -> Result<Vec<AccountingTransaction>, RepoError>;
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn record_rejection(&self, rejection: &DocumentRejection) -> Result<(), RepoError>;

    async fn rejections_for(&self, document_id: Uuid) -> Result<Vec<DocumentRejection>, RepoError>;
}
