pub mod models;
pub mod lifecycle;
pub mod repository;
pub mod manager;
pub mod effects;
pub mod accounting;
pub mod notifications;
pub mod documents;
pub mod memory;

pub use models::{NewReservation, PaymentType, Reservation, ReservationBuckets, ReservationStatus, StatusBucket, VehicleType};
pub use lifecycle::{RideAction, Transition, TransitionPolicy};
pub use manager::{Actor, CompletionReport, ReservationError, ReservationManager, StatusUpdate};
pub use effects::{EffectSink, SideEffect};
pub use accounting::{AccountingService, AccountingTransaction, NewTransaction};
pub use notifications::{NotificationService, NotifyError, NotifyOutcome, NotifyRequest};
pub use documents::{DocumentError, DocumentRejection, DocumentReviewService, RejectionDialog};
