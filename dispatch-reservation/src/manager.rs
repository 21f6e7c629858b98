use chrono::{DateTime, Utc};
use dispatch_core::events::EventPublisher;
use dispatch_core::validation::{validate_enum, validate_rating, validate_string};
use dispatch_core::{RepoError, ValidationErrors};
use dispatch_shared::models::events::{
    ReservationCreatedEvent, ReservationStatusChangedEvent, RESERVATION_CREATED_TOPIC,
    RESERVATION_STATUS_CHANGED_TOPIC,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::accounting::ride_revenue;
use crate::effects::{EffectSink, SideEffect};
use crate::lifecycle::{action_between, next_transition, RideAction, Transition, TransitionPolicy};
use crate::models::{GeoPoint, NewReservation, Reservation, ReservationBuckets, ReservationStatus};
use crate::repository::{ReservationFilter, ReservationRepository, RideDetails, StatusChange};

/// Who is issuing a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub is_admin: bool,
}

impl Actor {
    pub fn driver(user_id: Uuid) -> Self {
        Self { user_id, is_admin: false }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self { user_id, is_admin: true }
    }
}

/// What the driver reports when dropping the client off
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionReport {
    pub rating: Option<i64>,
    pub comment: Option<String>,
    pub distance: Option<String>,
    pub duration: Option<String>,
    pub route: Option<Vec<GeoPoint>>,
}

/// Direct status assignment with optional post-ride fields
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub reservation_id: Uuid,
    pub status: String,
    pub actual_pickup_time: Option<DateTime<Utc>>,
    pub dropoff_time: Option<DateTime<Utc>>,
    pub rating: Option<i64>,
    pub comment: Option<String>,
    pub distance: Option<String>,
    pub duration: Option<String>,
    pub route: Option<Vec<GeoPoint>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("Reservation not found: {0}")]
    NotFound(Uuid),

    #[error("Cannot {action} a reservation that is {from}")]
    InvalidTransition {
        from: ReservationStatus,
        action: String,
    },

    #[error("Reservation {0} was modified concurrently")]
    Conflict(Uuid),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("Repository error: {0}")]
    Repository(RepoError),
}

/// The authoritative command/query surface over reservations.
pub struct ReservationManager {
    repo: Arc<dyn ReservationRepository>,
    effects: Arc<dyn EffectSink>,
    events: Arc<dyn EventPublisher>,
    policy: TransitionPolicy,
}

impl ReservationManager {
    pub fn new(
        repo: Arc<dyn ReservationRepository>,
        effects: Arc<dyn EffectSink>,
        events: Arc<dyn EventPublisher>,
        policy: TransitionPolicy,
    ) -> Self {
        Self { repo, effects, events, policy }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Validate and store a new `pending` reservation, then queue the
    /// new-ride notification.
    pub async fn create(&self, payload: NewReservation) -> Result<Reservation, ReservationError> {
        let reservation = payload.into_reservation()?;
        self.repo
            .insert(&reservation)
            .await
            .map_err(|e| store_error(reservation.id, e))?;

        tracing::info!(
            "Created reservation {} for {} ({})",
            reservation.id,
            reservation.dispatcher,
            reservation.date
        );

        let event = ReservationCreatedEvent {
            reservation_id: reservation.id,
            dispatcher: reservation.dispatcher.clone(),
            driver_id: reservation.driver_id,
            scheduled_for: reservation.date.clone(),
            timestamp: Utc::now().timestamp(),
        };
        self.publish(RESERVATION_CREATED_TOPIC, reservation.id, &event).await;

        self.effects
            .dispatch(SideEffect::NotifyNewRide {
                reservation_id: reservation.id,
                driver_id: reservation.driver_id,
            })
            .await;

        Ok(reservation)
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<Reservation, ReservationError> {
        let reservation = self.load(id).await?;
        authorize(actor, &reservation)?;
        Ok(reservation)
    }

    /// Reservations visible to `actor`, grouped by list.
    pub async fn buckets(&self, actor: &Actor) -> Result<ReservationBuckets, ReservationError> {
        let filter = if actor.is_admin {
            ReservationFilter::All
        } else {
            ReservationFilter::VisibleTo(actor.user_id)
        };
        let reservations = self.repo.list(filter).await.map_err(ReservationError::Repository)?;
        Ok(ReservationBuckets::from_reservations(reservations))
    }

    /// pending → accepted. The accepting driver is assigned when none is.
    pub async fn accept(&self, actor: &Actor, id: Uuid) -> Result<Reservation, ReservationError> {
        self.perform(actor, id, RideAction::Accept, RideDetails::default()).await
    }

    /// An admin reject deletes the pending ride. A driver reject only hides
    /// it from that driver, releasing it if it was assigned to them.
    pub async fn reject(&self, actor: &Actor, id: Uuid) -> Result<Reservation, ReservationError> {
        self.perform(actor, id, RideAction::Reject, RideDetails::default()).await
    }

    pub async fn start_ride(&self, actor: &Actor, id: Uuid) -> Result<Reservation, ReservationError> {
        self.perform(actor, id, RideAction::StartRide, RideDetails::default()).await
    }

    pub async fn arrived(&self, actor: &Actor, id: Uuid) -> Result<Reservation, ReservationError> {
        self.perform(actor, id, RideAction::Arrive, RideDetails::default()).await
    }

    pub async fn client_boarded(&self, actor: &Actor, id: Uuid) -> Result<Reservation, ReservationError> {
        self.perform(actor, id, RideAction::BoardClient, RideDetails::default()).await
    }

    /// onBoard → completed, attaching the ride report.
    pub async fn complete(
        &self,
        actor: &Actor,
        id: Uuid,
        report: CompletionReport,
    ) -> Result<Reservation, ReservationError> {
        let details = ride_details(report.rating, report.comment.as_deref())?;
        let details = RideDetails {
            distance: report.distance,
            duration: report.duration,
            route: report.route,
            ..details
        };
        self.perform(actor, id, RideAction::Complete, details).await
    }

    /// Assign a status directly. Under `Strict` the move must be a single
    /// step of the transition table.
    pub async fn set_status(&self, actor: &Actor, update: StatusUpdate) -> Result<Reservation, ReservationError> {
        ValidationErrors::collect([
            validate_enum(&update.status, "status", &ReservationStatus::ALL),
            validate_rating(update.rating),
            validate_string(update.comment.as_deref(), "comment", 1000, false),
        ])?;
        let target = update
            .status
            .parse::<ReservationStatus>()
            .map_err(|e| ValidationErrors::single("status", e))?;

        let id = update.reservation_id;
        let current = self.load(id).await?;
        authorize(actor, &current)?;

        if self.policy == TransitionPolicy::Strict && action_between(current.status, target).is_none() {
            return Err(ReservationError::InvalidTransition {
                from: current.status,
                action: format!("set status {} on", target),
            });
        }

        let details = RideDetails {
            actual_pickup_time: update.actual_pickup_time,
            dropoff_time: update.dropoff_time,
            distance: update.distance,
            duration: update.duration,
            rating: update.rating.map(|r| r as u8),
            comment: update.comment,
            route: update.route,
        };
        let assign_driver = (target == ReservationStatus::Accepted)
            .then(|| assignee(actor, &current))
            .flatten();

        self.commit(actor, current, target, assign_driver, details).await
    }

    async fn perform(
        &self,
        actor: &Actor,
        id: Uuid,
        action: RideAction,
        details: RideDetails,
    ) -> Result<Reservation, ReservationError> {
        let current = self.load(id).await?;
        authorize(actor, &current)?;

        let transition = next_transition(current.status, action).ok_or_else(|| {
            ReservationError::InvalidTransition {
                from: current.status,
                action: action.to_string(),
            }
        })?;

        match transition {
            Transition::Remove if actor.is_admin => {
                let removed = self
                    .repo
                    .remove(id, current.status)
                    .await
                    .map_err(|e| store_error(id, e))?;
                tracing::info!("Reservation {} removed by admin {}", id, actor.user_id);
                self.publish_status_change(id, current.status, None, actor).await;
                Ok(removed)
            }
            Transition::Remove => {
                let declined = self
                    .repo
                    .decline(id, actor.user_id, current.status)
                    .await
                    .map_err(|e| store_error(id, e))?;
                tracing::info!("Reservation {} declined by driver {}", id, actor.user_id);
                Ok(declined)
            }
            Transition::To(next) => {
                let assign_driver = if action == RideAction::Accept {
                    assignee(actor, &current)
                } else {
                    None
                };
                self.commit(actor, current, next, assign_driver, details).await
            }
        }
    }

    async fn commit(
        &self,
        actor: &Actor,
        current: Reservation,
        next: ReservationStatus,
        assign_driver: Option<Uuid>,
        mut details: RideDetails,
    ) -> Result<Reservation, ReservationError> {
        let now = Utc::now();
        match next {
            ReservationStatus::Started if current.actual_pickup_time.is_none() => {
                details.actual_pickup_time.get_or_insert(now);
            }
            ReservationStatus::Completed if current.dropoff_time.is_none() => {
                details.dropoff_time.get_or_insert(now);
            }
            _ => {}
        }

        let change = StatusChange {
            expected: current.status,
            status: next,
            assign_driver,
            details,
        };
        let updated = self
            .repo
            .apply_status_change(current.id, &change)
            .await
            .map_err(|e| store_error(current.id, e))?;

        tracing::info!(
            "Reservation {} moved {} -> {} by {}",
            updated.id,
            current.status,
            updated.status,
            actor.user_id
        );
        self.publish_status_change(updated.id, current.status, Some(updated.status), actor)
            .await;

        if updated.status == ReservationStatus::Completed && current.status != ReservationStatus::Completed {
            self.effects
                .dispatch(SideEffect::SyncAccounting(ride_revenue(&updated)))
                .await;
        }

        Ok(updated)
    }

    async fn load(&self, id: Uuid) -> Result<Reservation, ReservationError> {
        self.repo
            .get(id)
            .await
            .map_err(ReservationError::Repository)?
            .ok_or(ReservationError::NotFound(id))
    }

    async fn publish_status_change(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: Option<ReservationStatus>,
        actor: &Actor,
    ) {
        let event = ReservationStatusChangedEvent {
            reservation_id: id,
            from_status: from.to_string(),
            to_status: to.map(|s| s.to_string()),
            actor_id: Some(actor.user_id),
            timestamp: Utc::now().timestamp(),
        };
        self.publish(RESERVATION_STATUS_CHANGED_TOPIC, id, &event).await;
    }

    async fn publish<E: serde::Serialize>(&self, topic: &str, key: Uuid, event: &E) {
        let payload = match serde_json::to_value(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Failed to serialize {} event: {}", topic, e);
                return;
            }
        };
        if let Err(e) = self.events.publish(topic, &key.to_string(), &payload).await {
            tracing::warn!("Failed to publish {} event for {}: {}", topic, key, e);
        }
    }
}

/// Drivers act on rides assigned to them and on unassigned pending ones.
fn authorize(actor: &Actor, reservation: &Reservation) -> Result<(), ReservationError> {
    if actor.is_admin || reservation.visible_to_driver(actor.user_id) {
        Ok(())
    } else {
        Err(ReservationError::Forbidden(
            "not allowed to modify this reservation".to_string(),
        ))
    }
}

fn assignee(actor: &Actor, current: &Reservation) -> Option<Uuid> {
    if current.driver_id.is_none() && !actor.is_admin {
        Some(actor.user_id)
    } else {
        None
    }
}

fn ride_details(rating: Option<i64>, comment: Option<&str>) -> Result<RideDetails, ValidationErrors> {
    ValidationErrors::collect([
        validate_rating(rating),
        validate_string(comment, "comment", 1000, false),
    ])?;
    Ok(RideDetails {
        rating: rating.map(|r| r as u8),
        comment: comment.map(str::to_string),
        ..RideDetails::default()
    })
}

fn store_error(id: Uuid, err: RepoError) -> ReservationError {
    match err {
        RepoError::NotFound(_) => ReservationError::NotFound(id),
        RepoError::Conflict(_) => ReservationError::Conflict(id),
        other => ReservationError::Repository(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::RecordingEffectSink;
    use crate::accounting::TransactionType;
    use crate::memory::InMemoryReservationRepository;
    use crate::models::{fixtures, StatusBucket};
    use dispatch_core::events::TracingEventPublisher;

    struct Harness {
        manager: ReservationManager,
        effects: Arc<RecordingEffectSink>,
        repo: Arc<InMemoryReservationRepository>,
    }

    fn harness(policy: TransitionPolicy) -> Harness {
        let repo = Arc::new(InMemoryReservationRepository::new());
        let effects = Arc::new(RecordingEffectSink::new());
        let manager = ReservationManager::new(
            repo.clone(),
            effects.clone(),
            Arc::new(TracingEventPublisher),
            policy,
        );
        Harness { manager, effects, repo }
    }

    fn report() -> CompletionReport {
        CompletionReport {
            rating: Some(5),
            comment: Some("Client très agréable".to_string()),
            distance: Some("34 km".to_string()),
            duration: Some("45 min".to_string()),
            route: None,
        }
    }

    #[tokio::test]
    async fn test_full_lifecycle_ends_completed() {
        let h = harness(TransitionPolicy::Strict);
        let driver = Actor::driver(Uuid::new_v4());
        let created = h.manager.create(fixtures::new_reservation()).await.unwrap();
        let id = created.id;

        let accepted = h.manager.accept(&driver, id).await.unwrap();
        assert_eq!(accepted.driver_id, Some(driver.user_id));
        let buckets = h.manager.buckets(&driver).await.unwrap();
        assert_eq!(buckets.contains(id), Some(StatusBucket::Current));

        let started = h.manager.start_ride(&driver, id).await.unwrap();
        assert!(started.actual_pickup_time.is_some());
        h.manager.arrived(&driver, id).await.unwrap();
        h.manager.client_boarded(&driver, id).await.unwrap();
        let done = h.manager.complete(&driver, id, report()).await.unwrap();

        assert_eq!(done.status, ReservationStatus::Completed);
        assert_eq!(done.rating, Some(5));
        assert_eq!(done.comment.as_deref(), Some("Client très agréable"));
        assert!(done.dropoff_time.is_some());

        let buckets = h.manager.buckets(&driver).await.unwrap();
        assert_eq!(buckets.contains(id), Some(StatusBucket::Completed));
    }

    #[tokio::test]
    async fn test_complete_queues_one_revenue_sync() {
        let h = harness(TransitionPolicy::Strict);
        let driver = Actor::driver(Uuid::new_v4());
        let id = h.manager.create(fixtures::new_reservation()).await.unwrap().id;
        h.manager.accept(&driver, id).await.unwrap();
        h.manager.start_ride(&driver, id).await.unwrap();
        h.manager.arrived(&driver, id).await.unwrap();
        h.manager.client_boarded(&driver, id).await.unwrap();
        h.manager.complete(&driver, id, report()).await.unwrap();

        let syncs: Vec<_> = h
            .effects
            .recorded()
            .await
            .into_iter()
            .filter_map(|e| match e {
                SideEffect::SyncAccounting(tx) => Some(tx),
                _ => None,
            })
            .collect();
        assert_eq!(syncs.len(), 1);
        assert_eq!(syncs[0].transaction_type, TransactionType::Revenue);
        assert_eq!(syncs[0].amount.to_string(), "85.00");
        assert_eq!(syncs[0].reservation_id, Some(id));

        // A second completion attempt is rejected and queues nothing.
        let err = h.manager.complete(&driver, id, report()).await.unwrap_err();
        assert!(matches!(err, ReservationError::InvalidTransition { .. }));
        assert_eq!(h.effects.recorded().await.len(), 2);
    }

    #[tokio::test]
    async fn test_driver_reject_hides_ride_from_that_driver_only() {
        let h = harness(TransitionPolicy::Strict);
        let (a, b) = (Actor::driver(Uuid::new_v4()), Actor::driver(Uuid::new_v4()));
        let id = h.manager.create(fixtures::new_reservation()).await.unwrap().id;

        let declined = h.manager.reject(&a, id).await.unwrap();
        assert_eq!(declined.status, ReservationStatus::Pending);

        assert_eq!(h.manager.buckets(&a).await.unwrap().contains(id), None);
        assert_eq!(h.manager.buckets(&b).await.unwrap().contains(id), Some(StatusBucket::Upcoming));
        let admin = Actor::admin(Uuid::new_v4());
        assert_eq!(h.manager.buckets(&admin).await.unwrap().contains(id), Some(StatusBucket::Upcoming));

        let accepted = h.manager.accept(&b, id).await.unwrap();
        assert_eq!(accepted.driver_id, Some(b.user_id));
    }

    #[tokio::test]
    async fn test_assigned_driver_reject_releases_ride() {
        let h = harness(TransitionPolicy::Strict);
        let a = Actor::driver(Uuid::new_v4());
        let b = Actor::driver(Uuid::new_v4());
        let mut new = fixtures::new_reservation();
        new.driver_id = Some(a.user_id);
        let id = h.manager.create(new).await.unwrap().id;
        assert_eq!(h.manager.buckets(&b).await.unwrap().contains(id), None);

        let released = h.manager.reject(&a, id).await.unwrap();
        assert_eq!(released.driver_id, None);
        assert_eq!(h.manager.buckets(&a).await.unwrap().contains(id), None);
        assert_eq!(h.manager.buckets(&b).await.unwrap().contains(id), Some(StatusBucket::Upcoming));
    }

    #[tokio::test]
    async fn test_admin_reject_removes_from_every_bucket() {
        let h = harness(TransitionPolicy::Strict);
        let admin = Actor::admin(Uuid::new_v4());
        let driver = Actor::driver(Uuid::new_v4());
        let id = h.manager.create(fixtures::new_reservation()).await.unwrap().id;

        h.manager.reject(&admin, id).await.unwrap();

        assert_eq!(h.manager.buckets(&admin).await.unwrap().contains(id), None);
        assert!(matches!(
            h.manager.get(&driver, id).await,
            Err(ReservationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_accept_then_complete_is_invalid() {
        let h = harness(TransitionPolicy::Strict);
        let driver = Actor::driver(Uuid::new_v4());
        let id = h.manager.create(fixtures::new_reservation()).await.unwrap().id;
        h.manager.accept(&driver, id).await.unwrap();

        let err = h.manager.complete(&driver, id, report()).await.unwrap_err();
        match err {
            ReservationError::InvalidTransition { from, action } => {
                assert_eq!(from, ReservationStatus::Accepted);
                assert_eq!(action, "complete");
            }
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
        let stored = h.manager.get(&driver, id).await.unwrap();
        assert_eq!(stored.status, ReservationStatus::Accepted);
        assert_eq!(stored.rating, None);
    }

    #[tokio::test]
    async fn test_set_status_strict_and_permissive() {
        let update = |id: Uuid| StatusUpdate {
            reservation_id: id,
            status: "completed".to_string(),
            actual_pickup_time: None,
            dropoff_time: None,
            rating: Some(4),
            comment: None,
            distance: None,
            duration: None,
            route: None,
        };
        let admin = Actor::admin(Uuid::new_v4());

        let strict = harness(TransitionPolicy::Strict);
        let id = strict.manager.create(fixtures::new_reservation()).await.unwrap().id;
        assert!(matches!(
            strict.manager.set_status(&admin, update(id)).await,
            Err(ReservationError::InvalidTransition { .. })
        ));

        let permissive = harness(TransitionPolicy::Permissive);
        let id = permissive.manager.create(fixtures::new_reservation()).await.unwrap().id;
        let done = permissive.manager.set_status(&admin, update(id)).await.unwrap();
        assert_eq!(done.status, ReservationStatus::Completed);
        assert_eq!(done.rating, Some(4));
    }

    #[tokio::test]
    async fn test_set_status_validates_payload() {
        let h = harness(TransitionPolicy::Strict);
        let update = StatusUpdate {
            reservation_id: Uuid::new_v4(),
            status: "rejected".to_string(),
            actual_pickup_time: None,
            dropoff_time: None,
            rating: Some(9),
            comment: None,
            distance: None,
            duration: None,
            route: None,
        };
        let err = h.manager.set_status(&Actor::admin(Uuid::new_v4()), update).await.unwrap_err();
        match err {
            ReservationError::Validation(errors) => assert_eq!(errors.errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_driver_is_forbidden() {
        let h = harness(TransitionPolicy::Strict);
        let owner = Actor::driver(Uuid::new_v4());
        let intruder = Actor::driver(Uuid::new_v4());
        let id = h.manager.create(fixtures::new_reservation()).await.unwrap().id;
        h.manager.accept(&owner, id).await.unwrap();

        assert!(matches!(
            h.manager.start_ride(&intruder, id).await,
            Err(ReservationError::Forbidden(_))
        ));
        assert!(h.manager.buckets(&intruder).await.unwrap().contains(id).is_none());
    }

    #[tokio::test]
    async fn test_stale_write_conflicts() {
        let h = harness(TransitionPolicy::Strict);
        let driver = Actor::driver(Uuid::new_v4());
        let id = h.manager.create(fixtures::new_reservation()).await.unwrap().id;

        // Another writer accepts behind the manager's back.
        let change = StatusChange {
            expected: ReservationStatus::Pending,
            status: ReservationStatus::Accepted,
            assign_driver: Some(driver.user_id),
            details: RideDetails::default(),
        };
        let stale = h.repo.get(id).await.unwrap().unwrap();
        h.repo.apply_status_change(id, &change).await.unwrap();

        let err = h
            .manager
            .commit(&driver, stale, ReservationStatus::Accepted, None, RideDetails::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_create_queues_notification() {
        let h = harness(TransitionPolicy::Strict);
        let created = h.manager.create(fixtures::new_reservation()).await.unwrap();
        assert_eq!(
            h.effects.recorded().await,
            vec![SideEffect::NotifyNewRide {
                reservation_id: created.id,
                driver_id: None
            }]
        );
    }

    #[tokio::test]
    async fn test_complete_rejects_bad_rating() {
        let h = harness(TransitionPolicy::Strict);
        let driver = Actor::driver(Uuid::new_v4());
        let id = h.manager.create(fixtures::new_reservation()).await.unwrap().id;
        let mut bad = report();
        bad.rating = Some(0);
        assert!(matches!(
            h.manager.complete(&driver, id, bad).await,
            Err(ReservationError::Validation(_))
        ));
    }
}
