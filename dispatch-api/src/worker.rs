//! Background execution of lifecycle side effects.
//!
//! Effects are queued on a bounded channel and run with at-least-once
//! semantics: transient failures are retried with exponential backoff until
//! `max_attempts` is reached, then logged and dropped. Pushes go through a
//! circuit breaker so a failing provider is not hammered.

use async_trait::async_trait;
use dispatch_core::RepoError;
use dispatch_reservation::effects::{EffectSink, SideEffect};
use dispatch_reservation::{AccountingService, NotificationService, NotifyError, NotifyRequest};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::middleware::CircuitBreaker;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub queue_capacity: usize,
}

impl WorkerSettings {
    /// Delay before attempt `attempt + 1`: doubles each time, capped.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

#[derive(Debug, thiserror::Error)]
enum EffectError {
    #[error("{0}")]
    Transient(String),
    #[error("{0}")]
    Permanent(String),
}

/// Producer side of the effect queue. Never blocks the caller.
#[derive(Clone)]
pub struct EffectQueue {
    tx: mpsc::Sender<SideEffect>,
}

#[async_trait]
impl EffectSink for EffectQueue {
    async fn dispatch(&self, effect: SideEffect) {
        match self.tx.try_send(effect) {
            Ok(()) => {}
            Err(TrySendError::Full(effect)) => {
                warn!("Effect queue full, deferring {}", effect.kind());
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = tx.send(effect).await {
                        error!("Effect {} lost: worker stopped", e.0.kind());
                    }
                });
            }
            Err(TrySendError::Closed(effect)) => {
                error!("Effect {} lost: worker stopped", effect.kind());
            }
        }
    }
}

#[derive(Clone)]
pub struct EffectWorker {
    accounting: Arc<AccountingService>,
    notifications: Arc<NotificationService>,
    push_breaker: Arc<CircuitBreaker>,
    settings: WorkerSettings,
}

impl EffectWorker {
    pub fn new(
        accounting: Arc<AccountingService>,
        notifications: Arc<NotificationService>,
        push_breaker: Arc<CircuitBreaker>,
        settings: WorkerSettings,
    ) -> Self {
        Self { accounting, notifications, push_breaker, settings }
    }

    /// Start consuming and hand back the producer side.
    pub fn spawn(self) -> EffectQueue {
        let (tx, mut rx) = mpsc::channel::<SideEffect>(self.settings.queue_capacity.max(1));
        tokio::spawn(async move {
            info!("Effect worker started");
            while let Some(effect) = rx.recv().await {
                let worker = self.clone();
                tokio::spawn(async move { worker.run_with_retry(effect).await });
            }
            info!("Effect worker stopped");
        });
        EffectQueue { tx }
    }

    async fn run_with_retry(&self, effect: SideEffect) {
        let max_attempts = self.settings.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.execute(&effect).await {
                Ok(()) => return,
                Err(EffectError::Permanent(reason)) => {
                    warn!("Dropping {}: {}", effect.kind(), reason);
                    return;
                }
                Err(EffectError::Transient(reason)) if attempt < max_attempts => {
                    let delay = self.settings.delay_after(attempt);
                    warn!(
                        "{} attempt {}/{} failed: {}; retrying in {:?}",
                        effect.kind(),
                        attempt,
                        max_attempts,
                        reason,
                        delay
                    );
                    sleep(delay).await;
                }
                Err(EffectError::Transient(reason)) => {
                    error!(
                        "{} exhausted after {} attempts: {} ({:?})",
                        effect.kind(),
                        max_attempts,
                        reason,
                        effect
                    );
                }
            }
        }
    }

    async fn execute(&self, effect: &SideEffect) -> Result<(), EffectError> {
        match effect {
            SideEffect::SyncAccounting(transaction) => {
                self.accounting
                    .record(transaction)
                    .await
                    .map(|_| ())
                    .map_err(|e| match e {
                        RepoError::Backend(msg) => EffectError::Transient(msg),
                        other => EffectError::Permanent(other.to_string()),
                    })
            }
            SideEffect::NotifyNewRide { reservation_id, driver_id } => {
                if !self.push_breaker.check().await {
                    return Err(EffectError::Transient(format!(
                        "circuit {} is open",
                        self.push_breaker.name
                    )));
                }
                let request = NotifyRequest {
                    reservation_id: *reservation_id,
                    driver_id: *driver_id,
                    title: None,
                    body: None,
                };
                match self.notifications.notify_reservation(request).await {
                    Ok(_) => {
                        self.push_breaker.record_success().await;
                        Ok(())
                    }
                    Err(e) if e.is_transient() => {
                        self.push_breaker.record_failure().await;
                        Err(EffectError::Transient(e.to_string()))
                    }
                    Err(e @ (NotifyError::NoToken | NotifyError::NoRecipients)) => {
                        info!("New ride {} not pushed: {}", reservation_id, e);
                        Ok(())
                    }
                    Err(e) => Err(EffectError::Permanent(e.to_string())),
                }
            }
        }
    }
}
