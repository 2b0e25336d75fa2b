use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Roles supplied by the upstream authentication service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Advisor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Advisor => "advisor",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "student" => Some(Role::Student),
            "advisor" => Some(Role::Advisor),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Minimal identity of a user referenced by a slot or booking. The full user
/// record lives in the authentication service; booking records and
/// notifications only need id, email and display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

impl UserRef {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.email
        } else {
            &self.name
        }
    }
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user: UserRef,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingType {
    Online,
    InPerson,
    Both,
}

impl MeetingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingType::Online => "online",
            MeetingType::InPerson => "in_person",
            MeetingType::Both => "both",
        }
    }

    pub fn parse(value: &str) -> Option<MeetingType> {
        match value {
            "online" => Some(MeetingType::Online),
            "in_person" => Some(MeetingType::InPerson),
            "both" => Some(MeetingType::Both),
            _ => None,
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            MeetingType::Online => "Online",
            MeetingType::InPerson => "In-person",
            MeetingType::Both => "Online + In-person",
        }
    }
}

/// An advisor-published bookable time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub advisor: UserRef,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub active: bool,
    pub meeting_type: MeetingType,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<BookingStatus> {
        match value {
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

/// A student's reservation of a slot. Bookings are never deleted; cancellation
/// is a terminal status transition so the record stays available for audit and
/// for re-downloading the CANCEL invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub student: UserRef,
    pub message: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Role>,
    pub cancellation_message: String,
}

impl Booking {
    pub fn is_confirmed(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }
}

/// Domain event emitted by the booking engine once a state change has been
/// persisted. The dispatcher consumes these after the fact; a failed
/// notification never rolls the change back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingEvent {
    Confirmed { booking: Booking, slot: Slot },
    Cancelled { booking: Booking, slot: Slot },
}
