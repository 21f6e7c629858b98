use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_core::repository::{DeviceToken, DeviceTokenRepository, PreferenceRepository};
use dispatch_core::{Language, RepoError};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::backend_error;

/// Per-driver settings: push token and UI language.
pub struct PgProfileRepository {
    pool: PgPool,
}

impl PgProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DeviceTokenRow {
    user_id: Uuid,
    token: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DeviceTokenRow> for DeviceToken {
    fn from(row: DeviceTokenRow) -> Self {
        DeviceToken {
            user_id: row.user_id,
            token: row.token,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl DeviceTokenRepository for PgProfileRepository {
    async fn upsert(&self, user_id: Uuid, token: &str) -> Result<DeviceToken, RepoError> {
        let row = sqlx::query_as::<_, DeviceTokenRow>(
            r#"
            INSERT INTO device_tokens (user_id, token)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET token = EXCLUDED.token, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(backend_error)?;
        Ok(row.into())
    }

    async fn get(&self, user_id: Uuid) -> Result<Option<DeviceToken>, RepoError> {
        let row = sqlx::query_as::<_, DeviceTokenRow>("SELECT * FROM device_tokens WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(row.map(DeviceToken::from))
    }

    async fn remove(&self, user_id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM device_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_all(&self) -> Result<Vec<DeviceToken>, RepoError> {
        let rows = sqlx::query_as::<_, DeviceTokenRow>("SELECT * FROM device_tokens")
            .fetch_all(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(rows.into_iter().map(DeviceToken::from).collect())
    }
}

#[async_trait]
impl PreferenceRepository for PgProfileRepository {
    async fn get_language(&self, user_id: Uuid) -> Result<Option<Language>, RepoError> {
        let code = sqlx::query_scalar::<_, String>("SELECT language FROM user_preferences WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_error)?;

        code.map(|c| {
            c.parse::<Language>()
                .map_err(|e| RepoError::Backend(e.to_string()))
        })
        .transpose()
    }

    async fn set_language(&self, user_id: Uuid, language: Language) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, language)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET language = EXCLUDED.language, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(language.code())
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;
        Ok(())
    }
}
