use chrono::{DateTime, Utc};
use dispatch_core::events::EventPublisher;
use dispatch_core::validation::{parse_amount, validate_date, validate_enum, validate_string};
use dispatch_core::{Amount, AmountInput, RepoError, ValidationErrors};
use dispatch_shared::models::events::{TransactionRecordedEvent, TRANSACTION_RECORDED_TOPIC};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::Reservation;
use crate::repository::AccountingRepository;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Revenue,
    Commission,
    Expense,
}

impl TransactionType {
    pub const CODES: [&'static str; 3] = ["revenue", "commission", "expense"];

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Revenue => "revenue",
            TransactionType::Commission => "commission",
            TransactionType::Expense => "expense",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "revenue" => Ok(TransactionType::Revenue),
            "commission" => Ok(TransactionType::Commission),
            "expense" => Ok(TransactionType::Expense),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

/// One row of the driver's ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountingTransaction {
    pub id: Uuid,
    pub reservation_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub amount: Amount,
    pub category: String,
    pub description: Option<String>,
    pub transaction_date: String,
    pub payment_status: String,
    /// Idempotency key for records produced by the system itself.
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Revenue record for a completed ride: amount is the reservation amount.
pub fn ride_revenue(reservation: &Reservation) -> AccountingTransaction {
    let completed_at = reservation.dropoff_time.unwrap_or_else(Utc::now);
    AccountingTransaction {
        id: Uuid::new_v4(),
        reservation_id: Some(reservation.id),
        transaction_type: TransactionType::Revenue,
        amount: reservation.amount,
        category: "ride".to_string(),
        description: Some(format!(
            "{} - {} → {}",
            reservation.client_name, reservation.pickup_address, reservation.destination
        )),
        transaction_date: completed_at.format("%Y-%m-%d").to_string(),
        payment_status: "pending".to_string(),
        external_ref: Some(format!("ride:{}:revenue", reservation.id)),
        created_at: Utc::now(),
    }
}

/// Payload accepted by the accounting sync endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct NewTransaction {
    pub reservation_id: Option<Uuid>,
    pub transaction_type: String,
    pub amount: AmountInput,
    pub category: String,
    pub description: Option<String>,
    pub transaction_date: String,
    pub payment_status: Option<String>,
}

impl NewTransaction {
    pub fn into_transaction(self) -> Result<AccountingTransaction, ValidationErrors> {
        let amount = parse_amount(&self.amount, "amount");
        ValidationErrors::collect([
            validate_enum(&self.transaction_type, "transaction_type", &TransactionType::CODES),
            amount.as_ref().err().cloned(),
            validate_string(Some(self.category.as_str()), "category", 100, true),
            validate_string(self.description.as_deref(), "description", 1000, false),
            validate_date(&self.transaction_date, "transaction_date"),
            validate_string(self.payment_status.as_deref(), "payment_status", 50, false),
        ])?;

        let transaction_type = self
            .transaction_type
            .parse::<TransactionType>()
            .map_err(|e| ValidationErrors::single("transaction_type", e))?;
        let amount = amount.map_err(|e| ValidationErrors { errors: vec![e] })?;

        Ok(AccountingTransaction {
            id: Uuid::new_v4(),
            reservation_id: self.reservation_id,
            transaction_type,
            amount,
            category: self.category.trim().to_string(),
            description: self.description,
            transaction_date: self.transaction_date,
            payment_status: self
                .payment_status
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "pending".to_string()),
            external_ref: None,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Inserted(AccountingTransaction),
    /// Same `external_ref` was already recorded; the stored row is returned.
    Duplicate(AccountingTransaction),
}

impl RecordOutcome {
    pub fn transaction(&self) -> &AccountingTransaction {
        match self {
            RecordOutcome::Inserted(tx) | RecordOutcome::Duplicate(tx) => tx,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountingSummary {
    pub total_revenue: Amount,
    pub total_commission: Amount,
    pub total_expense: Amount,
    /// Revenue minus commission and expenses; may be negative.
    pub net_cents: i64,
    pub transaction_count: usize,
}

impl AccountingSummary {
    pub fn from_transactions(transactions: &[AccountingTransaction]) -> Self {
        let total = |kind: TransactionType| -> Amount {
            transactions
                .iter()
                .filter(|t| t.transaction_type == kind)
                .map(|t| t.amount)
                .sum()
        };
        let total_revenue = total(TransactionType::Revenue);
        let total_commission = total(TransactionType::Commission);
        let total_expense = total(TransactionType::Expense);

        Self {
            total_revenue,
            total_commission,
            total_expense,
            net_cents: total_revenue.cents() - total_commission.cents() - total_expense.cents(),
            transaction_count: transactions.len(),
        }
    }
}

/// Records ledger entries and announces new ones
pub struct AccountingService {
    repo: Arc<dyn AccountingRepository>,
    events: Arc<dyn EventPublisher>,
}

impl AccountingService {
    pub fn new(repo: Arc<dyn AccountingRepository>, events: Arc<dyn EventPublisher>) -> Self {
        Self { repo, events }
    }

    pub async fn record(&self, transaction: &AccountingTransaction) -> Result<RecordOutcome, RepoError> {
        let outcome = self.repo.record(transaction).await?;

        match &outcome {
            RecordOutcome::Inserted(tx) => {
                tracing::info!(
                    "Recorded {} of {} for reservation {:?}",
                    tx.transaction_type,
                    tx.amount,
                    tx.reservation_id
                );
                let event = TransactionRecordedEvent {
                    transaction_id: tx.id,
                    reservation_id: tx.reservation_id,
                    transaction_type: tx.transaction_type.to_string(),
                    amount_cents: tx.amount.cents(),
                    timestamp: Utc::now().timestamp(),
                };
                let payload = serde_json::to_value(&event).unwrap_or_default();
                if let Err(e) = self
                    .events
                    .publish(TRANSACTION_RECORDED_TOPIC, &tx.id.to_string(), &payload)
                    .await
                {
                    tracing::warn!("Failed to publish transaction event: {}", e);
                }
            }
            RecordOutcome::Duplicate(tx) => {
                tracing::info!("Transaction {:?} already recorded, skipping", tx.external_ref);
            }
        }

        Ok(outcome)
    }

    pub async fn list(&self, reservation_id: Option<Uuid>) -> Result<Vec<AccountingTransaction>, RepoError> {
        self.repo.list(reservation_id).await
    }

    pub async fn summary(&self) -> Result<AccountingSummary, RepoError> {
        let transactions = self.repo.list(None).await?;
        Ok(AccountingSummary::from_transactions(&transactions))
    }
}
