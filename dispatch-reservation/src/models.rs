use chrono::{DateTime, Utc};
use dispatch_core::validation::{
    parse_amount, validate_date, validate_enum, validate_integer_range, validate_phone,
    validate_string,
};
use dispatch_core::{Amount, AmountInput, ValidationError, ValidationErrors};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Ride status, in lifecycle order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum ReservationStatus {
    Pending,
    Accepted,
    Started,
    Arrived,
    OnBoard,
    Completed,
}

impl ReservationStatus {
    pub const ALL: [ReservationStatus; 6] = [
        ReservationStatus::Pending,
        ReservationStatus::Accepted,
        ReservationStatus::Started,
        ReservationStatus::Arrived,
        ReservationStatus::OnBoard,
        ReservationStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Accepted => "accepted",
            ReservationStatus::Started => "started",
            ReservationStatus::Arrived => "arrived",
            ReservationStatus::OnBoard => "onBoard",
            ReservationStatus::Completed => "completed",
        }
    }

    pub fn bucket(self) -> StatusBucket {
        match self {
            ReservationStatus::Pending => StatusBucket::Upcoming,
            ReservationStatus::Completed => StatusBucket::Completed,
            _ => StatusBucket::Current,
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for ReservationStatus {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReservationStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown reservation status: {}", s))
    }
}

/// The list a reservation is shown under in the driver app.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusBucket {
    Upcoming,
    Current,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VehicleType {
    Standard,
    Berline,
    Van,
    MiniBus,
    FirstClass,
}

impl VehicleType {
    pub const CODES: [&'static str; 5] = ["standard", "berline", "van", "mini-bus", "first-class"];

    pub fn as_str(self) -> &'static str {
        match self {
            VehicleType::Standard => "standard",
            VehicleType::Berline => "berline",
            VehicleType::Van => "van",
            VehicleType::MiniBus => "mini-bus",
            VehicleType::FirstClass => "first-class",
        }
    }
}

impl FromStr for VehicleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(VehicleType::Standard),
            "berline" => Ok(VehicleType::Berline),
            "van" => Ok(VehicleType::Van),
            "mini-bus" => Ok(VehicleType::MiniBus),
            "first-class" => Ok(VehicleType::FirstClass),
            other => Err(format!("unknown vehicle type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Cash,
    Card,
    Transfer,
    Paypal,
}

impl PaymentType {
    pub const CODES: [&'static str; 4] = ["cash", "card", "transfer", "paypal"];

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentType::Cash => "cash",
            PaymentType::Card => "card",
            PaymentType::Transfer => "transfer",
            PaymentType::Paypal => "paypal",
        }
    }
}

impl FromStr for PaymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentType::Cash),
            "card" => Ok(PaymentType::Card),
            "transfer" => Ok(PaymentType::Transfer),
            "paypal" => Ok(PaymentType::Paypal),
            other => Err(format!("unknown payment type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FlightStatus {
    OnTime,
    Delayed,
    Landed,
    Boarding,
    Cancelled,
}

impl FlightStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FlightStatus::OnTime => "on-time",
            FlightStatus::Delayed => "delayed",
            FlightStatus::Landed => "landed",
            FlightStatus::Boarding => "boarding",
            FlightStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for FlightStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on-time" => Ok(FlightStatus::OnTime),
            "delayed" => Ok(FlightStatus::Delayed),
            "landed" => Ok(FlightStatus::Landed),
            "boarding" => Ok(FlightStatus::Boarding),
            "cancelled" => Ok(FlightStatus::Cancelled),
            other => Err(format!("unknown flight status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A ride request as dispatched to a driver
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reservation {
    pub id: Uuid,
    pub client_name: String,
    pub pickup_address: String,
    pub destination: String,
    /// Scheduled pickup, as submitted by the dispatcher.
    pub date: String,
    pub phone: String,
    pub flight_number: Option<String>,
    pub dispatcher: String,
    pub dispatcher_logo: Option<String>,
    pub passengers: u32,
    pub luggage: u32,
    pub amount: Amount,
    pub driver_amount: Amount,
    pub commission: Amount,
    pub vehicle_type: VehicleType,
    pub payment_type: PaymentType,
    pub status: ReservationStatus,
    pub driver_id: Option<Uuid>,
    pub actual_pickup_time: Option<DateTime<Utc>>,
    pub dropoff_time: Option<DateTime<Utc>>,
    pub distance: Option<String>,
    pub duration: Option<String>,
    pub rating: Option<u8>,
    pub comment: Option<String>,
    #[serde(default)]
    pub route: Vec<GeoPoint>,
    pub pickup_gps: Option<GeoPoint>,
    pub destination_gps: Option<GeoPoint>,
    pub flight_status: Option<FlightStatus>,
    pub placard_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn bucket(&self) -> StatusBucket {
        self.status.bucket()
    }

    /// Drivers see rides assigned to them plus unassigned pending ones.
    pub fn visible_to_driver(&self, driver_id: Uuid) -> bool {
        match self.driver_id {
            Some(assigned) => assigned == driver_id,
            None => self.status == ReservationStatus::Pending,
        }
    }

    pub fn update_status(&mut self, new_status: ReservationStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }
}

/// Creation payload sent by a dispatcher
#[derive(Debug, Clone, Deserialize)]
pub struct NewReservation {
    pub client_name: String,
    pub phone: String,
    pub pickup_address: String,
    pub destination: String,
    pub date: String,
    pub passengers: i64,
    #[serde(default)]
    pub luggage: i64,
    pub vehicle_type: String,
    pub payment_type: String,
    pub amount: AmountInput,
    pub commission: AmountInput,
    pub driver_amount: AmountInput,
    pub dispatcher: String,
    pub dispatcher_logo: Option<String>,
    pub flight_number: Option<String>,
    pub driver_id: Option<Uuid>,
    pub pickup_gps: Option<GeoPoint>,
    pub destination_gps: Option<GeoPoint>,
    pub placard_text: Option<String>,
}

impl NewReservation {
    /// Validate every field and build a `pending` reservation.
    pub fn into_reservation(self) -> Result<Reservation, ValidationErrors> {
        let amount = parse_amount(&self.amount, "amount");
        let commission = parse_amount(&self.commission, "commission");
        let driver_amount = parse_amount(&self.driver_amount, "driver_amount");

        let mut checks: Vec<Option<ValidationError>> = vec![
            validate_string(Some(self.client_name.as_str()), "client_name", 255, true),
            validate_phone(&self.phone),
            validate_string(Some(self.pickup_address.as_str()), "pickup_address", 500, true),
            validate_string(Some(self.destination.as_str()), "destination", 500, true),
            validate_date(&self.date, "date"),
            validate_integer_range(self.passengers, "passengers", 1, 50),
            validate_integer_range(self.luggage, "luggage", 0, 50),
            validate_enum(&self.vehicle_type, "vehicle_type", &VehicleType::CODES),
            validate_enum(&self.payment_type, "payment_type", &PaymentType::CODES),
            validate_string(Some(self.dispatcher.as_str()), "dispatcher", 255, true),
            validate_string(self.flight_number.as_deref(), "flight_number", 20, false),
            validate_string(self.placard_text.as_deref(), "placard_text", 255, false),
        ];
        checks.extend([
            amount.as_ref().err().cloned(),
            commission.as_ref().err().cloned(),
            driver_amount.as_ref().err().cloned(),
        ]);
        ValidationErrors::collect(checks)?;

        let (Ok(amount), Ok(commission), Ok(driver_amount)) = (amount, commission, driver_amount) else {
            return Err(ValidationErrors::single("amount", "amount must be a number"));
        };
        let vehicle_type = self
            .vehicle_type
            .parse::<VehicleType>()
            .map_err(|e: String| ValidationErrors::single("vehicle_type", e))?;
        let payment_type = self
            .payment_type
            .parse::<PaymentType>()
            .map_err(|e: String| ValidationErrors::single("payment_type", e))?;

        let now = Utc::now();
        Ok(Reservation {
            id: Uuid::new_v4(),
            client_name: self.client_name.trim().to_string(),
            pickup_address: self.pickup_address.trim().to_string(),
            destination: self.destination.trim().to_string(),
            date: self.date,
            phone: self.phone,
            flight_number: self.flight_number.filter(|f| !f.trim().is_empty()),
            dispatcher: self.dispatcher,
            dispatcher_logo: self.dispatcher_logo,
            passengers: self.passengers as u32,
            luggage: self.luggage as u32,
            amount,
            driver_amount,
            commission,
            vehicle_type,
            payment_type,
            status: ReservationStatus::Pending,
            driver_id: self.driver_id,
            actual_pickup_time: None,
            dropoff_time: None,
            distance: None,
            duration: None,
            rating: None,
            comment: None,
            route: Vec::new(),
            pickup_gps: self.pickup_gps,
            destination_gps: self.destination_gps,
            flight_status: None,
            placard_text: self.placard_text,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Reservations grouped the way the driver app lists them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReservationBuckets {
    pub upcoming: Vec<Reservation>,
    pub current: Vec<Reservation>,
    pub completed: Vec<Reservation>,
}

impl ReservationBuckets {
    pub fn from_reservations(reservations: impl IntoIterator<Item = Reservation>) -> Self {
        let mut buckets = Self::default();
        for reservation in reservations {
            match reservation.bucket() {
                StatusBucket::Upcoming => buckets.upcoming.push(reservation),
                StatusBucket::Current => buckets.current.push(reservation),
                StatusBucket::Completed => buckets.completed.push(reservation),
            }
        }
        buckets.upcoming.sort_by(|a, b| a.date.cmp(&b.date));
        buckets.current.sort_by(|a, b| a.date.cmp(&b.date));
        buckets.completed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        buckets
    }

    pub fn contains(&self, id: Uuid) -> Option<StatusBucket> {
        if self.upcoming.iter().any(|r| r.id == id) {
            Some(StatusBucket::Upcoming)
        } else if self.current.iter().any(|r| r.id == id) {
            Some(StatusBucket::Current)
        } else if self.completed.iter().any(|r| r.id == id) {
            Some(StatusBucket::Completed)
        } else {
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn new_reservation() -> NewReservation {
        NewReservation {
            client_name: "Marie Laurent".to_string(),
            phone: "+33 6 12 34 56 78".to_string(),
            pickup_address: "Aéroport Charles de Gaulle, Terminal 2E".to_string(),
            destination: "15 Rue de Rivoli, Paris".to_string(),
            date: "2026-10-20T08:30:00+02:00".to_string(),
            passengers: 2,
            luggage: 3,
            vehicle_type: "berline".to_string(),
            payment_type: "card".to_string(),
            amount: AmountInput::Text("85.00".to_string()),
            commission: AmountInput::Number(17.0),
            driver_amount: AmountInput::Text("68.00".to_string()),
            dispatcher: "Elite Transfers".to_string(),
            dispatcher_logo: None,
            flight_number: Some("AF1234".to_string()),
            driver_id: None,
            pickup_gps: None,
            destination_gps: None,
            placard_text: None,
        }
    }

    pub fn reservation() -> Reservation {
        new_reservation().into_reservation().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&ReservationStatus::OnBoard).unwrap(), "\"onBoard\"");
        assert_eq!("onBoard".parse::<ReservationStatus>().unwrap(), ReservationStatus::OnBoard);
        assert!("rejected".parse::<ReservationStatus>().is_err());
        assert_eq!(serde_json::to_string(&VehicleType::MiniBus).unwrap(), "\"mini-bus\"");
        assert_eq!(serde_json::to_string(&FlightStatus::OnTime).unwrap(), "\"on-time\"");
    }

    #[test]
    fn test_buckets_follow_status() {
        assert_eq!(ReservationStatus::Pending.bucket(), StatusBucket::Upcoming);
        for status in [
            ReservationStatus::Accepted,
            ReservationStatus::Started,
            ReservationStatus::Arrived,
            ReservationStatus::OnBoard,
        ] {
            assert_eq!(status.bucket(), StatusBucket::Current);
        }
        assert_eq!(ReservationStatus::Completed.bucket(), StatusBucket::Completed);
    }

    #[test]
    fn test_new_reservation_is_pending() {
        let reservation = fixtures::reservation();
        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(reservation.amount.to_string(), "85.00");
        assert_eq!(reservation.commission.cents(), 1700);
        assert_eq!(reservation.vehicle_type, VehicleType::Berline);
    }

    #[test]
    fn test_new_reservation_reports_every_bad_field() {
        let mut payload = fixtures::new_reservation();
        payload.phone = "123".to_string();
        payload.vehicle_type = "limo".to_string();
        payload.amount = AmountInput::Text("12.999".to_string());
        payload.passengers = 0;

        let errors = payload.into_reservation().unwrap_err();
        let fields: Vec<&str> = errors.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["phone", "passengers", "vehicle_type", "amount"]);
    }

    #[test]
    fn test_driver_visibility() {
        let driver = Uuid::new_v4();
        let mut reservation = fixtures::reservation();
        assert!(reservation.visible_to_driver(driver));

        reservation.driver_id = Some(Uuid::new_v4());
        assert!(!reservation.visible_to_driver(driver));

        reservation.driver_id = Some(driver);
        reservation.update_status(ReservationStatus::Accepted);
        assert!(reservation.visible_to_driver(driver));
    }
}
