use crate::error::Result;
use crate::types::{Booking, MeetingType, Role, Slot, UserRef};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Parameters for a new availability slot.
#[derive(Debug, Clone)]
pub struct NewSlot {
    pub advisor: UserRef,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub meeting_type: MeetingType,
    pub message: String,
}

/// Optional filters for listing bookable slots.
#[derive(Debug, Clone, Default)]
pub struct SlotFilter {
    pub advisor: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Repository interface over availability slots.
///
/// Implementations own the overlap check inside `create_slot`: the check and
/// the insert must observe the same state.
pub trait SlotStore: Clone + Send + Sync + 'static {
    fn create_slot(&self, slot: NewSlot) -> Result<Slot>;

    fn get_slot(&self, id: Uuid) -> Result<Slot>;

    /// Active slots with no confirmed booking, ordered by start time.
    fn list_available(&self, filter: &SlotFilter) -> Result<Vec<Slot>>;

    /// Marks the slot inactive and cancels its confirmed booking, if any.
    /// Returns the cancelled booking so the engine can emit an event.
    fn deactivate_slot(&self, id: Uuid, by: Role) -> Result<Option<Booking>>;
}

/// Repository interface over bookings.
///
/// `insert_booking` is the concurrency-sensitive operation: the
/// slot-is-free check and the insert run as one critical section, so two
/// students racing for the same slot can never both get a confirmed booking.
pub trait BookingStore: Clone + Send + Sync + 'static {
    fn insert_booking(
        &self,
        slot_id: Uuid,
        student: UserRef,
        message: String,
    ) -> Result<(Booking, Slot)>;

    /// Marks a confirmed booking cancelled and records who cancelled it.
    /// The already-cancelled case is handled by the engine, which reads the
    /// booking first; this method expects a confirmed booking.
    fn cancel_booking(
        &self,
        booking_id: Uuid,
        by: Role,
        message: String,
    ) -> Result<(Booking, Slot)>;

    fn get_booking(&self, id: Uuid) -> Result<(Booking, Slot)>;

    /// Bookings visible to a user, ordered by slot start time. Students see
    /// their own bookings, advisors the bookings on their slots, admins all.
    fn list_for_user(
        &self,
        user_id: Uuid,
        role: Role,
        upcoming_only: bool,
    ) -> Result<Vec<(Booking, Slot)>>;
}
