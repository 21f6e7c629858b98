//! In-process implementations of the repository traits. Used when no
//! database is configured and throughout the test suites.

use async_trait::async_trait;
use chrono::Utc;
use dispatch_core::repository::{DeviceToken, DeviceTokenRepository, PreferenceRepository};
use dispatch_core::{Language, RepoError};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::accounting::{AccountingTransaction, RecordOutcome};
use crate::documents::DocumentRejection;
use crate::models::{Reservation, ReservationStatus};
use crate::repository::{
    AccountingRepository, DocumentRepository, ReservationFilter, ReservationRepository, StatusChange,
};

#[derive(Default)]
pub struct InMemoryReservationRepository {
    reservations: RwLock<HashMap<Uuid, Reservation>>,
    /// `(reservation, driver)` pairs
    declines: RwLock<HashSet<(Uuid, Uuid)>>,
}

impl InMemoryReservationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReservationRepository for InMemoryReservationRepository {
    async fn insert(&self, reservation: &Reservation) -> Result<(), RepoError> {
        let mut reservations = self.reservations.write().await;
        if reservations.contains_key(&reservation.id) {
            return Err(RepoError::Conflict(format!("reservation {} already exists", reservation.id)));
        }
        reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Reservation>, RepoError> {
        Ok(self.reservations.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: ReservationFilter) -> Result<Vec<Reservation>, RepoError> {
        let reservations = self.reservations.read().await;
        let declines = self.declines.read().await;
        Ok(reservations
            .values()
            .filter(|r| match filter {
                ReservationFilter::All => true,
                ReservationFilter::VisibleTo(driver) => {
                    r.visible_to_driver(driver) && !declines.contains(&(r.id, driver))
                }
            })
            .cloned()
            .collect())
    }

    async fn apply_status_change(
        &self,
        id: Uuid,
        change: &StatusChange,
    ) -> Result<Reservation, RepoError> {
        // Check and write under one lock so the swap is atomic.
        let mut reservations = self.reservations.write().await;
        let reservation = reservations
            .get_mut(&id)
            .ok_or_else(|| RepoError::NotFound(id.to_string()))?;

        if reservation.status != change.expected {
            return Err(RepoError::Conflict(format!(
                "reservation {} is {}, expected {}",
                id, reservation.status, change.expected
            )));
        }

        reservation.update_status(change.status);
        if let Some(driver) = change.assign_driver {
            reservation.driver_id = Some(driver);
        }
        change.details.apply_to(reservation);
        Ok(reservation.clone())
    }

    async fn remove(&self, id: Uuid, expected: ReservationStatus) -> Result<Reservation, RepoError> {
        let mut reservations = self.reservations.write().await;
        match reservations.get(&id) {
            None => Err(RepoError::NotFound(id.to_string())),
            Some(r) if r.status != expected => Err(RepoError::Conflict(format!(
                "reservation {} is {}, expected {}",
                id, r.status, expected
            ))),
            Some(_) => {
                self.declines.write().await.retain(|(reservation, _)| *reservation != id);
                reservations
                    .remove(&id)
                    .ok_or_else(|| RepoError::NotFound(id.to_string()))
            }
        }
    }

    async fn decline(
        &self,
        id: Uuid,
        driver_id: Uuid,
        expected: ReservationStatus,
    ) -> Result<Reservation, RepoError> {
        let mut reservations = self.reservations.write().await;
        let reservation = reservations
            .get_mut(&id)
            .ok_or_else(|| RepoError::NotFound(id.to_string()))?;

        if reservation.status != expected {
            return Err(RepoError::Conflict(format!(
                "reservation {} is {}, expected {}",
                id, reservation.status, expected
            )));
        }

        if reservation.driver_id == Some(driver_id) {
            reservation.driver_id = None;
            reservation.updated_at = Utc::now();
        }
        self.declines.write().await.insert((id, driver_id));
        Ok(reservation.clone())
    }
}

#[derive(Default)]
pub struct InMemoryAccountingRepository {
    transactions: RwLock<Vec<AccountingTransaction>>,
}

impl InMemoryAccountingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountingRepository for InMemoryAccountingRepository {
    async fn record(&self, transaction: &AccountingTransaction) -> Result<RecordOutcome, RepoError> {
        let mut transactions = self.transactions.write().await;
        if let Some(reference) = &transaction.external_ref {
            if let Some(existing) = transactions
                .iter()
                .find(|t| t.external_ref.as_ref() == Some(reference))
            {
                return Ok(RecordOutcome::Duplicate(existing.clone()));
            }
        }
        transactions.push(transaction.clone());
        Ok(RecordOutcome::Inserted(transaction.clone()))
    }

    async fn list(&self, reservation_id: Option<Uuid>) -> Result<Vec<AccountingTransaction>, RepoError> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .iter()
            .filter(|t| reservation_id.is_none() || t.reservation_id == reservation_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryDocumentRepository {
    rejections: RwLock<Vec<DocumentRejection>>,
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn record_rejection(&self, rejection: &DocumentRejection) -> Result<(), RepoError> {
        self.rejections.write().await.push(rejection.clone());
        Ok(())
    }

    async fn rejections_for(&self, document_id: Uuid) -> Result<Vec<DocumentRejection>, RepoError> {
        let rejections = self.rejections.read().await;
        Ok(rejections
            .iter()
            .filter(|r| r.document_id == document_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryDeviceTokenRepository {
    tokens: RwLock<HashMap<Uuid, DeviceToken>>,
}

impl InMemoryDeviceTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceTokenRepository for InMemoryDeviceTokenRepository {
    async fn upsert(&self, user_id: Uuid, token: &str) -> Result<DeviceToken, RepoError> {
        let mut tokens = self.tokens.write().await;
        let now = Utc::now();
        let entry = tokens.entry(user_id).or_insert_with(|| DeviceToken {
            user_id,
            token: token.to_string(),
            created_at: now,
            updated_at: now,
        });
        entry.token = token.to_string();
        entry.updated_at = now;
        Ok(entry.clone())
    }

    async fn get(&self, user_id: Uuid) -> Result<Option<DeviceToken>, RepoError> {
        Ok(self.tokens.read().await.get(&user_id).cloned())
    }

    async fn remove(&self, user_id: Uuid) -> Result<bool, RepoError> {
        Ok(self.tokens.write().await.remove(&user_id).is_some())
    }

    async fn list_all(&self) -> Result<Vec<DeviceToken>, RepoError> {
        Ok(self.tokens.read().await.values().cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryPreferenceRepository {
    languages: RwLock<HashMap<Uuid, Language>>,
}

impl InMemoryPreferenceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceRepository for InMemoryPreferenceRepository {
    async fn get_language(&self, user_id: Uuid) -> Result<Option<Language>, RepoError> {
        Ok(self.languages.read().await.get(&user_id).copied())
    }

    async fn set_language(&self, user_id: Uuid, language: Language) -> Result<(), RepoError> {
        self.languages.write().await.insert(user_id, language);
        Ok(())
    }
}
