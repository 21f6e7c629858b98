use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::language::Language;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepoError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("concurrent modification: {0}")]
    Conflict(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// The single active push token of a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceToken {
    pub user_id: Uuid,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storage for FCM device tokens, unique per user
#[async_trait]
pub trait DeviceTokenRepository: Send + Sync {
    /// Insert or replace the user's token.
    async fn upsert(&self, user_id: Uuid, token: &str) -> Result<DeviceToken, RepoError>;

    async fn get(&self, user_id: Uuid) -> Result<Option<DeviceToken>, RepoError>;

    /// Returns `true` when a token was removed.
    async fn remove(&self, user_id: Uuid) -> Result<bool, RepoError>;

    async fn list_all(&self) -> Result<Vec<DeviceToken>, RepoError>;
}

#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    async fn get_language(&self, user_id: Uuid) -> Result<Option<Language>, RepoError>;

    async fn set_language(&self, user_id: Uuid, language: Language) -> Result<(), RepoError>;
}
