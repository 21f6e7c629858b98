use dispatch_core::notification::{PushError, PushMessage, PushProvider, PushReceipt};
use dispatch_core::repository::{DeviceTokenRepository, PreferenceRepository};
use dispatch_core::{Language, RepoError};
use dispatch_shared::Masked;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::models::Reservation;
use crate::repository::ReservationRepository;

/// Deep link opened when the notification is tapped.
pub const RESERVATIONS_LINK: &str = "/reservations";

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyRequest {
    #[serde(alias = "reservationId")]
    pub reservation_id: Uuid,
    #[serde(default, alias = "driverId")]
    pub driver_id: Option<Uuid>,
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum NotifyOutcome {
    Sent { driver_id: Uuid, receipt: PushReceipt },
    /// Nobody is assigned: every registered device was targeted.
    Broadcast { sent: usize, total: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Reservation not found: {0}")]
    ReservationNotFound(Uuid),
    #[error("driver has not enabled notifications")]
    NoToken,
    #[error("no driver has notifications enabled")]
    NoRecipients,
    #[error(transparent)]
    Push(#[from] PushError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepoError),
}

impl NotifyError {
    pub fn is_transient(&self) -> bool {
        match self {
            NotifyError::Push(e) => e.is_transient(),
            NotifyError::Repository(RepoError::Backend(_)) => true,
            _ => false,
        }
    }
}

/// Delivers ride notifications to drivers' devices.
pub struct NotificationService {
    reservations: Arc<dyn ReservationRepository>,
    tokens: Arc<dyn DeviceTokenRepository>,
    preferences: Arc<dyn PreferenceRepository>,
    provider: Arc<dyn PushProvider>,
}

impl NotificationService {
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        tokens: Arc<dyn DeviceTokenRepository>,
        preferences: Arc<dyn PreferenceRepository>,
        provider: Arc<dyn PushProvider>,
    ) -> Self {
        Self { reservations, tokens, preferences, provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Target is the explicit driver, else the assigned one, else everyone
    /// with a registered device.
    pub async fn notify_reservation(&self, request: NotifyRequest) -> Result<NotifyOutcome, NotifyError> {
        let reservation = self
            .reservations
            .get(request.reservation_id)
            .await?
            .ok_or(NotifyError::ReservationNotFound(request.reservation_id))?;

        match request.driver_id.or(reservation.driver_id) {
            Some(driver_id) => self.notify_driver(&reservation, driver_id, &request).await,
            None => {
                tracing::info!(
                    "Reservation {} has no driver, notifying every registered device",
                    reservation.id
                );
                self.broadcast(&reservation, &request).await
            }
        }
    }

    async fn notify_driver(
        &self,
        reservation: &Reservation,
        driver_id: Uuid,
        request: &NotifyRequest,
    ) -> Result<NotifyOutcome, NotifyError> {
        let token = self.tokens.get(driver_id).await?.ok_or_else(|| {
            tracing::warn!("Driver {} has no device token", driver_id);
            NotifyError::NoToken
        })?;

        let language = self.language_of(driver_id).await;
        let message = build_message(reservation, token.token, language, request);

        match self.provider.send(&message).await {
            Ok(receipt) => {
                tracing::info!("Notification for {} sent to driver {}", reservation.id, driver_id);
                Ok(NotifyOutcome::Sent { driver_id, receipt })
            }
            Err(PushError::Unregistered) => {
                tracing::warn!(
                    "Token {} of driver {} is no longer registered, removing it",
                    Masked(message.token.as_str()),
                    driver_id
                );
                self.tokens.remove(driver_id).await?;
                Err(NotifyError::NoToken)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn broadcast(
        &self,
        reservation: &Reservation,
        request: &NotifyRequest,
    ) -> Result<NotifyOutcome, NotifyError> {
        let devices = self.tokens.list_all().await?;
        if devices.is_empty() {
            return Err(NotifyError::NoRecipients);
        }
        let total = devices.len();

        let mut sends = JoinSet::new();
        for device in devices {
            let language = self.language_of(device.user_id).await;
            let message = build_message(reservation, device.token, language, request);
            let provider = self.provider.clone();
            sends.spawn(async move { (device.user_id, provider.send(&message).await) });
        }

        let mut sent = 0;
        // A transient failure wins so that a fully failed broadcast is retried.
        let mut failure: Option<PushError> = None;
        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((_, Ok(_))) => sent += 1,
                Ok((user_id, Err(PushError::Unregistered))) => {
                    if let Err(e) = self.tokens.remove(user_id).await {
                        tracing::warn!("Failed to drop stale token of {}: {}", user_id, e);
                    }
                }
                Ok((user_id, Err(e))) => {
                    tracing::warn!("Push to {} failed: {}", user_id, e);
                    if !failure.as_ref().is_some_and(PushError::is_transient) {
                        failure = Some(e);
                    }
                }
                Err(e) => tracing::error!("Push task panicked: {}", e),
            }
        }

        tracing::info!("{}/{} notifications sent for {}", sent, total, reservation.id);
        if sent == 0 {
            return Err(match failure {
                Some(e) => NotifyError::Push(e),
                None => NotifyError::NoRecipients,
            });
        }
        Ok(NotifyOutcome::Broadcast { sent, total })
    }

    async fn language_of(&self, user_id: Uuid) -> Language {
        match self.preferences.get_language(user_id).await {
            Ok(language) => language.unwrap_or_default(),
            Err(e) => {
                tracing::debug!("Language lookup for {} failed: {}", user_id, e);
                Language::default()
            }
        }
    }
}

fn build_message(
    reservation: &Reservation,
    token: String,
    language: Language,
    request: &NotifyRequest,
) -> PushMessage {
    let title = request
        .title
        .clone()
        .unwrap_or_else(|| language.new_ride_title().to_string());
    let body = request.body.clone().unwrap_or_else(|| {
        format!(
            "{} - {} → {}",
            reservation.client_name, reservation.pickup_address, reservation.destination
        )
    });

    let data = BTreeMap::from([
        ("reservationId".to_string(), reservation.id.to_string()),
        ("clientName".to_string(), reservation.client_name.clone()),
        ("pickup".to_string(), reservation.pickup_address.clone()),
        ("destination".to_string(), reservation.destination.clone()),
        ("amount".to_string(), reservation.amount.to_string()),
    ]);

    PushMessage {
        token,
        title,
        body,
        data,
        link: Some(RESERVATIONS_LINK.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{
        InMemoryDeviceTokenRepository, InMemoryPreferenceRepository, InMemoryReservationRepository,
    };
    use crate::models::fixtures;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// Records messages; tokens starting with "stale" are reported
    /// unregistered and tokens starting with "down" fail in transport.
    #[derive(Default)]
    struct CapturingProvider {
        sent: Mutex<Vec<PushMessage>>,
    }

    #[async_trait]
    impl PushProvider for CapturingProvider {
        fn name(&self) -> &str {
            "capture"
        }

        async fn send(&self, message: &PushMessage) -> Result<PushReceipt, PushError> {
            if message.token.starts_with("stale") {
                return Err(PushError::Unregistered);
            }
            if message.token.starts_with("down") {
                return Err(PushError::Transport("connection reset".to_string()));
            }
            self.sent.lock().await.push(message.clone());
            Ok(PushReceipt {
                provider: "capture".to_string(),
                message_id: "m-1".to_string(),
            })
        }
    }

    struct Harness {
        service: NotificationService,
        provider: Arc<CapturingProvider>,
        tokens: Arc<InMemoryDeviceTokenRepository>,
        preferences: Arc<InMemoryPreferenceRepository>,
        reservation: Reservation,
    }

    async fn harness(driver_id: Option<Uuid>) -> Harness {
        let reservations = Arc::new(InMemoryReservationRepository::new());
        let mut reservation = fixtures::reservation();
        reservation.driver_id = driver_id;
        reservations.insert(&reservation).await.unwrap();

        let tokens = Arc::new(InMemoryDeviceTokenRepository::new());
        let preferences = Arc::new(InMemoryPreferenceRepository::new());
        let provider = Arc::new(CapturingProvider::default());
        let service = NotificationService::new(
            reservations,
            tokens.clone(),
            preferences.clone(),
            provider.clone(),
        );
        Harness { service, provider, tokens, preferences, reservation }
    }

    fn request(reservation_id: Uuid) -> NotifyRequest {
        NotifyRequest { reservation_id, driver_id: None, title: None, body: None }
    }

    #[tokio::test]
    async fn test_assigned_driver_gets_localized_message() {
        let driver = Uuid::new_v4();
        let h = harness(Some(driver)).await;
        h.tokens.upsert(driver, "token-driver").await.unwrap();
        h.preferences.set_language(driver, Language::En).await.unwrap();

        let outcome = h.service.notify_reservation(request(h.reservation.id)).await.unwrap();
        assert!(matches!(outcome, NotifyOutcome::Sent { driver_id, .. } if driver_id == driver));

        let sent = h.provider.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, Language::En.new_ride_title());
        assert_eq!(
            sent[0].body,
            "Marie Laurent - Aéroport Charles de Gaulle, Terminal 2E → 15 Rue de Rivoli, Paris"
        );
        assert_eq!(sent[0].data["amount"], "85.00");
        assert_eq!(sent[0].data["reservationId"], h.reservation.id.to_string());
        assert_eq!(sent[0].link.as_deref(), Some(RESERVATIONS_LINK));
    }

    #[tokio::test]
    async fn test_driver_without_token() {
        let h = harness(Some(Uuid::new_v4())).await;
        let err = h.service.notify_reservation(request(h.reservation.id)).await.unwrap_err();
        assert_eq!(err.to_string(), "driver has not enabled notifications");
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_broadcast_counts_and_prunes_stale_tokens() {
        let h = harness(None).await;
        let (a, b, stale) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        h.tokens.upsert(a, "token-a").await.unwrap();
        h.tokens.upsert(b, "token-b").await.unwrap();
        h.tokens.upsert(stale, "stale-token").await.unwrap();

        let mut req = request(h.reservation.id);
        req.title = Some("Course urgente".to_string());
        let outcome = h.service.notify_reservation(req).await.unwrap();

        assert_eq!(outcome, NotifyOutcome::Broadcast { sent: 2, total: 3 });
        assert!(h.tokens.get(stale).await.unwrap().is_none());
        assert!(h
            .provider
            .sent
            .lock()
            .await
            .iter()
            .all(|m| m.title == "Course urgente"));
    }

    #[tokio::test]
    async fn test_broadcast_where_every_push_fails_is_transient_error() {
        let h = harness(None).await;
        h.tokens.upsert(Uuid::new_v4(), "down-a").await.unwrap();
        h.tokens.upsert(Uuid::new_v4(), "down-b").await.unwrap();
        h.tokens.upsert(Uuid::new_v4(), "stale-c").await.unwrap();

        let err = h.service.notify_reservation(request(h.reservation.id)).await.unwrap_err();
        assert!(matches!(err, NotifyError::Push(PushError::Transport(_))));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_broadcast_with_partial_failure_succeeds() {
        let h = harness(None).await;
        h.tokens.upsert(Uuid::new_v4(), "token-a").await.unwrap();
        h.tokens.upsert(Uuid::new_v4(), "down-b").await.unwrap();

        let outcome = h.service.notify_reservation(request(h.reservation.id)).await.unwrap();
        assert_eq!(outcome, NotifyOutcome::Broadcast { sent: 1, total: 2 });
    }

    #[tokio::test]
    async fn test_broadcast_to_only_stale_tokens_has_no_recipients() {
        let h = harness(None).await;
        h.tokens.upsert(Uuid::new_v4(), "stale-a").await.unwrap();

        let err = h.service.notify_reservation(request(h.reservation.id)).await.unwrap_err();
        assert!(matches!(err, NotifyError::NoRecipients));
    }

    #[tokio::test]
    async fn test_broadcast_without_devices() {
        let h = harness(None).await;
        let err = h.service.notify_reservation(request(h.reservation.id)).await.unwrap_err();
        assert!(matches!(err, NotifyError::NoRecipients));
    }

    #[tokio::test]
    async fn test_unknown_reservation() {
        let h = harness(None).await;
        let err = h.service.notify_reservation(request(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, NotifyError::ReservationNotFound(_)));
    }
}
