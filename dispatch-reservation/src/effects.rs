use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::accounting::AccountingTransaction;

/// Work triggered by a lifecycle change that runs outside the transition
/// itself (network calls with retries).
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    SyncAccounting(AccountingTransaction),
    NotifyNewRide {
        reservation_id: Uuid,
        driver_id: Option<Uuid>,
    },
}

impl SideEffect {
    pub fn kind(&self) -> &'static str {
        match self {
            SideEffect::SyncAccounting(_) => "sync_accounting",
            SideEffect::NotifyNewRide { .. } => "notify_new_ride",
        }
    }
}

/// Accepts side effects for later execution. Never fails the caller.
#[async_trait]
pub trait EffectSink: Send + Sync {
    async fn dispatch(&self, effect: SideEffect);
}

/// Keeps dispatched effects in memory, for tests and dry runs.
#[derive(Default)]
pub struct RecordingEffectSink {
    effects: Mutex<Vec<SideEffect>>,
}

impl RecordingEffectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn recorded(&self) -> Vec<SideEffect> {
        self.effects.lock().await.clone()
    }
}

#[async_trait]
impl EffectSink for RecordingEffectSink {
    async fn dispatch(&self, effect: SideEffect) {
        self.effects.lock().await.push(effect);
    }
}
