use dispatch_core::events::EventPublisher;
use dispatch_core::notification::PushProvider;
use dispatch_core::repository::{DeviceTokenRepository, PreferenceRepository};
use dispatch_reservation::memory::{
    InMemoryAccountingRepository, InMemoryDeviceTokenRepository, InMemoryDocumentRepository,
    InMemoryPreferenceRepository, InMemoryReservationRepository,
};
use dispatch_reservation::repository::{AccountingRepository, DocumentRepository, ReservationRepository};
use dispatch_reservation::{
    AccountingService, DocumentReviewService, NotificationService, ReservationManager, TransitionPolicy,
};
use dispatch_store::{
    Config, PgAccountingRepository, PgDocumentRepository, PgProfileRepository, PgReservationRepository,
    DbClient, RedisClient,
};
use std::sync::Arc;
use std::time::Duration;

use crate::middleware::CircuitBreaker;
use crate::worker::{EffectWorker, WorkerSettings};

const PUSH_FAILURE_THRESHOLD: usize = 5;
const PUSH_RESET_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

/// Backing storage for every repository the services need.
#[derive(Clone)]
pub struct Stores {
    pub reservations: Arc<dyn ReservationRepository>,
    pub accounting: Arc<dyn AccountingRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub devices: Arc<dyn DeviceTokenRepository>,
    pub preferences: Arc<dyn PreferenceRepository>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            reservations: Arc::new(InMemoryReservationRepository::new()),
            accounting: Arc::new(InMemoryAccountingRepository::new()),
            documents: Arc::new(InMemoryDocumentRepository::new()),
            devices: Arc::new(InMemoryDeviceTokenRepository::new()),
            preferences: Arc::new(InMemoryPreferenceRepository::new()),
        }
    }

    pub fn postgres(db: &DbClient) -> Self {
        let pool = db.pool.clone();
        let profiles = Arc::new(PgProfileRepository::new(pool.clone()));
        Self {
            reservations: Arc::new(PgReservationRepository::new(pool.clone())),
            accounting: Arc::new(PgAccountingRepository::new(pool.clone())),
            documents: Arc::new(PgDocumentRepository::new(pool)),
            devices: profiles.clone(),
            preferences: profiles,
        }
    }
}

#[derive(Clone)]
pub struct AppSettings {
    pub auth: AuthConfig,
    pub policy: TransitionPolicy,
    pub worker: WorkerSettings,
    pub allowed_origins: Vec<String>,
}

impl AppSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            auth: AuthConfig {
                secret: config.auth.jwt_secret.clone(),
                expiration: config.auth.jwt_expiration_seconds,
            },
            policy: config.business_rules.transition_policy,
            worker: WorkerSettings {
                max_attempts: config.worker.max_attempts,
                base_delay: Duration::from_millis(config.worker.base_delay_ms),
                queue_capacity: config.worker.queue_capacity,
            },
            allowed_origins: config.cors.allowed_origins.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub reservations: Arc<ReservationManager>,
    pub accounting: Arc<AccountingService>,
    pub notifications: Arc<NotificationService>,
    pub documents: Arc<DocumentReviewService>,
    pub devices: Arc<dyn DeviceTokenRepository>,
    pub preferences: Arc<dyn PreferenceRepository>,
    pub redis: Option<Arc<RedisClient>>,
    pub push_breaker: Arc<CircuitBreaker>,
    pub auth: AuthConfig,
    pub allowed_origins: Vec<String>,
}

impl AppState {
    /// Wire the services together and start the effect worker.
    /// Must be called inside a Tokio runtime.
    pub fn assemble(
        stores: Stores,
        provider: Arc<dyn PushProvider>,
        events: Arc<dyn EventPublisher>,
        settings: AppSettings,
        redis: Option<Arc<RedisClient>>,
    ) -> Self {
        let accounting = Arc::new(AccountingService::new(stores.accounting.clone(), events.clone()));
        let notifications = Arc::new(NotificationService::new(
            stores.reservations.clone(),
            stores.devices.clone(),
            stores.preferences.clone(),
            provider,
        ));
        let push_breaker = Arc::new(CircuitBreaker::new(
            notifications.provider_name(),
            PUSH_FAILURE_THRESHOLD,
            PUSH_RESET_TIMEOUT,
        ));

        let queue = EffectWorker::new(
            accounting.clone(),
            notifications.clone(),
            push_breaker.clone(),
            settings.worker,
        )
        .spawn();

        let reservations = Arc::new(ReservationManager::new(
            stores.reservations,
            Arc::new(queue),
            events,
            settings.policy,
        ));

        Self {
            reservations,
            accounting,
            notifications,
            documents: Arc::new(DocumentReviewService::new(stores.documents)),
            devices: stores.devices,
            preferences: stores.preferences,
            redis,
            push_breaker,
            auth: settings.auth,
            allowed_origins: settings.allowed_origins,
        }
    }
}
