use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::ReservationStatus;

/// Driver actions that move a reservation through its lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RideAction {
    Accept,
    Reject,
    StartRide,
    Arrive,
    BoardClient,
    Complete,
}

impl RideAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RideAction::Accept => "accept",
            RideAction::Reject => "reject",
            RideAction::StartRide => "start_ride",
            RideAction::Arrive => "arrive",
            RideAction::BoardClient => "board_client",
            RideAction::Complete => "complete",
        }
    }
}

impl fmt::Display for RideAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    To(ReservationStatus),
    /// The reservation leaves the active lists.
    Remove,
}

/// `(current, action) → outcome`. Any pair not listed is rejected.
const TRANSITIONS: [(ReservationStatus, RideAction, Transition); 6] = [
    (ReservationStatus::Pending, RideAction::Accept, Transition::To(ReservationStatus::Accepted)),
    (ReservationStatus::Pending, RideAction::Reject, Transition::Remove),
    (ReservationStatus::Accepted, RideAction::StartRide, Transition::To(ReservationStatus::Started)),
    (ReservationStatus::Started, RideAction::Arrive, Transition::To(ReservationStatus::Arrived)),
    (ReservationStatus::Arrived, RideAction::BoardClient, Transition::To(ReservationStatus::OnBoard)),
    (ReservationStatus::OnBoard, RideAction::Complete, Transition::To(ReservationStatus::Completed)),
];

pub fn next_transition(current: ReservationStatus, action: RideAction) -> Option<Transition> {
    TRANSITIONS
        .iter()
        .find(|(from, on, _)| *from == current && *on == action)
        .map(|(_, _, outcome)| *outcome)
}

/// Actions the table allows from `current`.
pub fn available_actions(current: ReservationStatus) -> Vec<RideAction> {
    TRANSITIONS
        .iter()
        .filter(|(from, _, _)| *from == current)
        .map(|(_, action, _)| *action)
        .collect()
}

/// The action that leads from `from` to `to`, if the table has one.
pub fn action_between(from: ReservationStatus, to: ReservationStatus) -> Option<RideAction> {
    TRANSITIONS
        .iter()
        .find(|(f, _, outcome)| *f == from && *outcome == Transition::To(to))
        .map(|(_, action, _)| *action)
}

/// Whether direct status assignment must follow the transition table.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    #[default]
    Strict,
    /// Any status may be set directly (administrative override).
    Permissive,
}

impl FromStr for TransitionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(TransitionPolicy::Strict),
            "permissive" => Ok(TransitionPolicy::Permissive),
            other => Err(format!("unknown transition policy: {}", other)),
        }
    }
}
