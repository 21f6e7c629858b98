use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_core::RepoError;
use dispatch_reservation::documents::DocumentRejection;
use dispatch_reservation::repository::DocumentRepository;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::backend_error;

pub struct PgDocumentRepository {
    pool: PgPool,
}

impl PgDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RejectionRow {
    document_id: Uuid,
    reason: String,
    rejected_by: Uuid,
    rejected_at: DateTime<Utc>,
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn record_rejection(&self, rejection: &DocumentRejection) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO document_rejections (document_id, reason, rejected_by, rejected_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(rejection.document_id)
        .bind(&rejection.reason)
        .bind(rejection.rejected_by)
        .bind(rejection.rejected_at)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;
        Ok(())
    }

    async fn rejections_for(&self, document_id: Uuid) -> Result<Vec<DocumentRejection>, RepoError> {
        let rows = sqlx::query_as::<_, RejectionRow>(
            r#"
            SELECT document_id, reason, rejected_by, rejected_at
            FROM document_rejections
            WHERE document_id = $1
            ORDER BY rejected_at
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(rows
            .into_iter()
            .map(|row| DocumentRejection {
                document_id: row.document_id,
                reason: row.reason,
                rejected_by: row.rejected_by,
                rejected_at: row.rejected_at,
            })
            .collect())
    }
}
