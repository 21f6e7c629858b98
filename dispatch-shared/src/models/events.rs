use uuid::Uuid;

pub const RESERVATION_CREATED_TOPIC: &str = "reservation.created";
pub const RESERVATION_STATUS_CHANGED_TOPIC: &str = "reservation.status_changed";
pub const TRANSACTION_RECORDED_TOPIC: &str = "accounting.transaction_recorded";

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ReservationCreatedEvent {
    pub reservation_id: Uuid,
    pub dispatcher: String,
    pub driver_id: Option<Uuid>,
    pub scheduled_for: String,
    pub timestamp: i64,
}

/// Emitted on every lifecycle move. `to_status` is `None` when the
/// reservation was deleted by an admin reject.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ReservationStatusChangedEvent {
    pub reservation_id: Uuid,
    pub from_status: String,
    pub to_status: Option<String>,
    pub actor_id: Option<Uuid>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct TransactionRecordedEvent {
    pub transaction_id: Uuid,
    pub reservation_id: Option<Uuid>,
    pub transaction_type: String,
    pub amount_cents: i64,
    pub timestamp: i64,
}
