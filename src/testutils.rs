use crate::error::{Error, Result, TransportError};
use crate::notify::{InviteAttachment, NotificationTransport, Recipient};
use crate::store::{BookingStore, NewSlot, SlotFilter, SlotStore};
use crate::types::{Booking, BookingStatus, MeetingType, Role, Slot, UserRef};
use chrono::{Duration, Utc};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use uuid::Uuid;

pub struct MockStoreInner {
    pub success: AtomicBool,
    pub calls_to_create_slot: AtomicU64,
    pub calls_to_list_available: AtomicU64,
    pub calls_to_deactivate_slot: AtomicU64,
    pub calls_to_insert_booking: AtomicU64,
    pub calls_to_cancel_booking: AtomicU64,
    pub calls_to_get_booking: AtomicU64,
    pub calls_to_list_for_user: AtomicU64,
}

/// Hand-rolled store double for HTTP-level tests: counts calls and flips
/// between canned success and failure via the `success` flag.
#[derive(Clone)]
pub struct MockStore(pub Arc<MockStoreInner>);

impl MockStore {
    pub fn new() -> Self {
        Self(Arc::new(MockStoreInner {
            success: AtomicBool::new(true),
            calls_to_create_slot: AtomicU64::default(),
            calls_to_list_available: AtomicU64::default(),
            calls_to_deactivate_slot: AtomicU64::default(),
            calls_to_insert_booking: AtomicU64::default(),
            calls_to_cancel_booking: AtomicU64::default(),
            calls_to_get_booking: AtomicU64::default(),
            calls_to_list_for_user: AtomicU64::default(),
        }))
    }

    fn succeeding(&self) -> bool {
        self.0.success.load(Ordering::SeqCst)
    }

    fn canned_slot(&self) -> Slot {
        let starts_at = Utc::now() + Duration::hours(24);
        Slot {
            id: Uuid::new_v4(),
            advisor: UserRef {
                id: Uuid::new_v4(),
                email: "advisor@example.com".into(),
                name: "Ada Advisor".into(),
            },
            starts_at,
            ends_at: starts_at + Duration::minutes(30),
            active: true,
            meeting_type: MeetingType::Online,
            message: String::new(),
        }
    }

    fn canned_booking(&self, slot: &Slot, student: UserRef) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            slot_id: slot.id,
            student,
            message: String::new(),
            status: BookingStatus::Confirmed,
            created_at: Utc::now(),
            cancelled_at: None,
            cancelled_by: None,
            cancellation_message: String::new(),
        }
    }

    fn unrelated_student(&self) -> UserRef {
        UserRef {
            id: Uuid::new_v4(),
            email: "student@example.com".into(),
            name: "Sam Student".into(),
        }
    }
}

impl SlotStore for MockStore {
    fn create_slot(&self, new: NewSlot) -> Result<Slot> {
        self.0.calls_to_create_slot.fetch_add(1, Ordering::SeqCst);
        if !self.succeeding() {
            return Err(Error::Validation("Supposed to fail".into()));
        }
        let mut slot = self.canned_slot();
        slot.advisor = new.advisor;
        slot.starts_at = new.starts_at;
        slot.ends_at = new.ends_at;
        Ok(slot)
    }

    fn get_slot(&self, id: Uuid) -> Result<Slot> {
        let mut slot = self.canned_slot();
        slot.id = id;
        Ok(slot)
    }

    fn list_available(&self, _filter: &SlotFilter) -> Result<Vec<Slot>> {
        self.0.calls_to_list_available.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    fn deactivate_slot(&self, _id: Uuid, _by: Role) -> Result<Option<Booking>> {
        self.0
            .calls_to_deactivate_slot
            .fetch_add(1, Ordering::SeqCst);
        if !self.succeeding() {
            return Err(Error::Validation("Supposed to fail".into()));
        }
        Ok(None)
    }
}

impl BookingStore for MockStore {
    fn insert_booking(
        &self,
        slot_id: Uuid,
        student: UserRef,
        message: String,
    ) -> Result<(Booking, Slot)> {
        self.0.calls_to_insert_booking.fetch_add(1, Ordering::SeqCst);
        if !self.succeeding() {
            return Err(Error::Conflict("this slot has already been booked".into()));
        }
        let mut slot = self.canned_slot();
        slot.id = slot_id;
        let mut booking = self.canned_booking(&slot, student);
        booking.message = message;
        Ok((booking, slot))
    }

    fn cancel_booking(
        &self,
        booking_id: Uuid,
        by: Role,
        message: String,
    ) -> Result<(Booking, Slot)> {
        self.0.calls_to_cancel_booking.fetch_add(1, Ordering::SeqCst);
        if !self.succeeding() {
            return Err(Error::Validation("Supposed to fail".into()));
        }
        let slot = self.canned_slot();
        let mut booking = self.canned_booking(&slot, self.unrelated_student());
        booking.id = booking_id;
        booking.status = BookingStatus::Cancelled;
        booking.cancelled_at = Some(Utc::now());
        booking.cancelled_by = Some(by);
        booking.cancellation_message = message;
        Ok((booking, slot))
    }

    fn get_booking(&self, id: Uuid) -> Result<(Booking, Slot)> {
        self.0.calls_to_get_booking.fetch_add(1, Ordering::SeqCst);
        let slot = self.canned_slot();
        let mut booking = self.canned_booking(&slot, self.unrelated_student());
        booking.id = id;
        Ok((booking, slot))
    }

    fn list_for_user(
        &self,
        _user_id: Uuid,
        _role: Role,
        _upcoming_only: bool,
    ) -> Result<Vec<(Booking, Slot)>> {
        self.0.calls_to_list_for_user.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

/// Transport double that records how many sends were attempted.
#[derive(Default)]
pub struct CountingTransport {
    pub sends: AtomicU64,
}

impl NotificationTransport for CountingTransport {
    fn send(
        &self,
        _to: &Recipient,
        _subject: &str,
        _body: &str,
        _attachment: Option<&InviteAttachment>,
    ) -> std::result::Result<(), TransportError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
