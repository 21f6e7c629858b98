use anyhow::Context;
use dispatch_api::{app, AppSettings, AppState, Stores};
use dispatch_core::events::{EventPublisher, TracingEventPublisher};
use dispatch_core::notification::{LogPushProvider, PushProvider};
use dispatch_store::{Config, DbClient, FcmPushProvider, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dispatch_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting dispatch API on port {}", config.server.port);

    let stores = match &config.database.url {
        Some(url) => {
            let db = DbClient::new(url).await.context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Stores::postgres(&db)
        }
        None => {
            tracing::warn!("No database configured, using in-memory stores");
            Stores::in_memory()
        }
    };

    let redis = match &config.redis.url {
        Some(url) => Some(Arc::new(
            RedisClient::new(url).await.context("Failed to connect to Redis")?,
        )),
        None => None,
    };

    let events = event_publisher(&config)?;

    let provider: Arc<dyn PushProvider> = match &config.fcm.service_account_path {
        Some(path) => Arc::new(FcmPushProvider::from_file(path).context("Failed to set up FCM")?),
        None => {
            tracing::warn!("No FCM service account configured, pushes will only be logged");
            Arc::new(LogPushProvider)
        }
    };

    let state = AppState::assemble(stores, provider, events, AppSettings::from_config(&config), redis);
    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

#[cfg(feature = "kafka")]
fn event_publisher(config: &Config) -> anyhow::Result<Arc<dyn EventPublisher>> {
    match &config.kafka.brokers {
        Some(brokers) => {
            let producer = dispatch_store::EventProducer::new(brokers)
                .context("Failed to create Kafka producer")?;
            Ok(Arc::new(producer))
        }
        None => Ok(Arc::new(TracingEventPublisher)),
    }
}

#[cfg(not(feature = "kafka"))]
fn event_publisher(config: &Config) -> anyhow::Result<Arc<dyn EventPublisher>> {
    if config.kafka.brokers.is_some() {
        tracing::warn!("kafka.brokers is set but the kafka feature is disabled; logging events instead");
    }
    Ok(Arc::new(TracingEventPublisher))
}
