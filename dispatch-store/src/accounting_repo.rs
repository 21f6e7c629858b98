use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_core::{Amount, RepoError};
use dispatch_reservation::accounting::{AccountingTransaction, RecordOutcome};
use dispatch_reservation::repository::AccountingRepository;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::backend_error;

pub struct PgAccountingRepository {
    pool: PgPool,
}

impl PgAccountingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    reservation_id: Option<Uuid>,
    transaction_type: String,
    amount_cents: i64,
    category: String,
    description: Option<String>,
    transaction_date: String,
    payment_status: String,
    external_ref: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for AccountingTransaction {
    type Error = RepoError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = |e: String| RepoError::Backend(format!("transaction {}: {}", id, e));
        Ok(AccountingTransaction {
            id,
            reservation_id: row.reservation_id,
            transaction_type: row.transaction_type.parse().map_err(corrupt)?,
            amount: Amount::from_cents(row.amount_cents).map_err(|e| corrupt(e.to_string()))?,
            category: row.category,
            description: row.description,
            transaction_date: row.transaction_date,
            payment_status: row.payment_status,
            external_ref: row.external_ref,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl AccountingRepository for PgAccountingRepository {
    async fn record(&self, tx: &AccountingTransaction) -> Result<RecordOutcome, RepoError> {
        let inserted = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO accounting_transactions (
                id, reservation_id, transaction_type, amount_cents, category, description,
                transaction_date, payment_status, external_ref, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (external_ref) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(tx.id)
        .bind(tx.reservation_id)
        .bind(tx.transaction_type.as_str())
        .bind(tx.amount.cents())
        .bind(&tx.category)
        .bind(&tx.description)
        .bind(&tx.transaction_date)
        .bind(&tx.payment_status)
        .bind(&tx.external_ref)
        .bind(tx.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        if let Some(row) = inserted {
            return Ok(RecordOutcome::Inserted(row.try_into()?));
        }

        let existing = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM accounting_transactions WHERE external_ref = $1",
        )
        .bind(&tx.external_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(backend_error)?;
        Ok(RecordOutcome::Duplicate(existing.try_into()?))
    }

    async fn list(&self, reservation_id: Option<Uuid>) -> Result<Vec<AccountingTransaction>, RepoError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT * FROM accounting_transactions
            WHERE $1::uuid IS NULL OR reservation_id = $1
            ORDER BY transaction_date DESC, created_at DESC
            "#,
        )
        .bind(reservation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        rows.into_iter().map(AccountingTransaction::try_from).collect()
    }
}
