pub mod app_config;
pub mod database;
pub mod reservation_repo;
pub mod accounting_repo;
pub mod profile_repo;
pub mod document_repo;
pub mod redis_repo;
pub mod fcm;
#[cfg(feature = "kafka")]
pub mod events;

pub use app_config::Config;
pub use database::DbClient;
pub use redis_repo::RedisClient;
pub use fcm::FcmPushProvider;
pub use reservation_repo::PgReservationRepository;
pub use accounting_repo::PgAccountingRepository;
pub use profile_repo::PgProfileRepository;
pub use document_repo::PgDocumentRepository;
#[cfg(feature = "kafka")]
pub use events::EventProducer;
