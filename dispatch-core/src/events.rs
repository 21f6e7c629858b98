use async_trait::async_trait;
use serde_json::Value;

use crate::CoreResult;

/// Outbound channel for domain events (Kafka in production).
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &Value) -> CoreResult<()>;
}

/// Publisher that only writes events to the log.
pub struct TracingEventPublisher;

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &Value) -> CoreResult<()> {
        tracing::info!(topic, key, "event: {}", payload);
        Ok(())
    }
}
