use crate::error::{Error, Result};
use crate::store::{BookingStore, NewSlot, SlotFilter, SlotStore};
use crate::types::{Booking, BookingStatus, Role, Slot, UserRef};
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<Uuid, Slot>,
    bookings: HashMap<Uuid, Booking>,
}

/// In-memory store used when no database is configured, and by most tests.
///
/// A single mutex guards slots and bookings together, so every operation is
/// one critical section. That is the whole serialization story here: two
/// concurrent `insert_booking` calls on the same slot are ordered by the lock,
/// and the loser sees the winner's confirmed booking.
#[derive(Debug, Clone, Default)]
pub struct LocalStore {
    inner: Arc<Mutex<Inner>>,
}

impl Inner {
    fn confirmed_booking_for_slot(&self, slot_id: Uuid) -> Option<&Booking> {
        self.bookings
            .values()
            .find(|b| b.slot_id == slot_id && b.is_confirmed())
    }

    fn student_has_booking_on_date(&self, student_id: Uuid, date: chrono::NaiveDate) -> bool {
        self.bookings.values().any(|b| {
            b.is_confirmed()
                && b.student.id == student_id
                && self
                    .slots
                    .get(&b.slot_id)
                    .is_some_and(|s| s.starts_at.date_naive() == date)
        })
    }

    fn cancel(&mut self, booking_id: Uuid, by: Role, message: String) -> Result<(Booking, Slot)> {
        let booking = self
            .bookings
            .get_mut(&booking_id)
            .ok_or(Error::NotFound("booking"))?;
        // Cancelled is terminal. A second cancel that slips past the
        // engine's pre-check returns the stored record untouched.
        if booking.is_confirmed() {
            booking.status = BookingStatus::Cancelled;
            booking.cancelled_at = Some(Utc::now());
            booking.cancelled_by = Some(by);
            booking.cancellation_message = message;
        }
        let booking = booking.clone();
        let slot = self
            .slots
            .get(&booking.slot_id)
            .cloned()
            .ok_or(Error::NotFound("slot"))?;
        Ok((booking, slot))
    }
}

impl SlotStore for LocalStore {
    fn create_slot(&self, new: NewSlot) -> Result<Slot> {
        let mut inner = self.inner.lock().unwrap();
        let overlaps = inner.slots.values().any(|s| {
            s.active
                && s.advisor.id == new.advisor.id
                && s.starts_at < new.ends_at
                && new.starts_at < s.ends_at
        });
        if overlaps {
            return Err(Error::Validation(
                "the window overlaps one of your existing slots".into(),
            ));
        }

        let slot = Slot {
            id: Uuid::new_v4(),
            advisor: new.advisor,
            starts_at: new.starts_at,
            ends_at: new.ends_at,
            active: true,
            meeting_type: new.meeting_type,
            message: new.message,
        };
        inner.slots.insert(slot.id, slot.clone());
        Ok(slot)
    }

    fn get_slot(&self, id: Uuid) -> Result<Slot> {
        let inner = self.inner.lock().unwrap();
        inner.slots.get(&id).cloned().ok_or(Error::NotFound("slot"))
    }

    fn list_available(&self, filter: &SlotFilter) -> Result<Vec<Slot>> {
        let inner = self.inner.lock().unwrap();
        let mut slots: Vec<Slot> = inner
            .slots
            .values()
            .filter(|s| s.active && inner.confirmed_booking_for_slot(s.id).is_none())
            .filter(|s| filter.advisor.map_or(true, |a| s.advisor.id == a))
            .filter(|s| filter.from.map_or(true, |from| s.starts_at >= from))
            .filter(|s| filter.to.map_or(true, |to| s.starts_at < to))
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.starts_at);
        Ok(slots)
    }

    fn deactivate_slot(&self, id: Uuid, by: Role) -> Result<Option<Booking>> {
        let mut inner = self.inner.lock().unwrap();
        let slot = inner.slots.get_mut(&id).ok_or(Error::NotFound("slot"))?;
        slot.active = false;

        let cancelled = match inner.confirmed_booking_for_slot(id).map(|b| b.id) {
            Some(booking_id) => {
                let (booking, _) =
                    inner.cancel(booking_id, by, "The slot was withdrawn.".into())?;
                Some(booking)
            }
            None => None,
        };
        Ok(cancelled)
    }
}

impl BookingStore for LocalStore {
    fn insert_booking(
        &self,
        slot_id: Uuid,
        student: UserRef,
        message: String,
    ) -> Result<(Booking, Slot)> {
        let mut inner = self.inner.lock().unwrap();

        let slot = inner
            .slots
            .get(&slot_id)
            .cloned()
            .ok_or(Error::NotFound("slot"))?;
        if !slot.active {
            return Err(Error::Validation("this slot is no longer offered".into()));
        }
        if inner.confirmed_booking_for_slot(slot_id).is_some() {
            return Err(Error::Conflict("this slot has already been booked".into()));
        }
        if inner.student_has_booking_on_date(student.id, slot.starts_at.date_naive()) {
            return Err(Error::Validation(
                "you already have a booking on this date".into(),
            ));
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            slot_id,
            student,
            message,
            status: BookingStatus::Confirmed,
            created_at: Utc::now(),
            cancelled_at: None,
            cancelled_by: None,
            cancellation_message: String::new(),
        };
        inner.bookings.insert(booking.id, booking.clone());
        Ok((booking, slot))
    }

    fn cancel_booking(
        &self,
        booking_id: Uuid,
        by: Role,
        message: String,
    ) -> Result<(Booking, Slot)> {
        let mut inner = self.inner.lock().unwrap();
        inner.cancel(booking_id, by, message)
    }

    fn get_booking(&self, id: Uuid) -> Result<(Booking, Slot)> {
        let inner = self.inner.lock().unwrap();
        let booking = inner
            .bookings
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound("booking"))?;
        let slot = inner
            .slots
            .get(&booking.slot_id)
            .cloned()
            .ok_or(Error::NotFound("slot"))?;
        Ok((booking, slot))
    }

    fn list_for_user(
        &self,
        user_id: Uuid,
        role: Role,
        upcoming_only: bool,
    ) -> Result<Vec<(Booking, Slot)>> {
        let inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let mut rows: Vec<(Booking, Slot)> = inner
            .bookings
            .values()
            .filter_map(|b| inner.slots.get(&b.slot_id).map(|s| (b.clone(), s.clone())))
            .filter(|(b, s)| match role {
                Role::Student => b.student.id == user_id,
                Role::Advisor => s.advisor.id == user_id,
                Role::Admin => true,
            })
            .filter(|(_, s)| !upcoming_only || s.starts_at >= now)
            .collect();
        rows.sort_by_key(|(_, s)| s.starts_at);
        Ok(rows)
    }
}
