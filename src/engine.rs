use crate::error::{Error, Result};
use crate::ics;
use crate::onboarding::OnboardingGate;
use crate::store::{BookingStore, NewSlot, SlotFilter, SlotStore};
use crate::types::{Actor, Booking, BookingEvent, MeetingType, Role, Slot};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

const MAX_SLOT_MESSAGE_LEN: usize = 200;

/// Authorization and booking policy over a store. The store serializes the
/// concurrency-sensitive steps; everything else (who may do what, input
/// validation, event emission) lives here.
#[derive(Debug)]
pub struct BookingEngine<S, G> {
    store: S,
    gate: Arc<G>,
}

impl<S, G> Clone for BookingEngine<S, G>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<S, G> BookingEngine<S, G>
where
    S: SlotStore + BookingStore,
    G: OnboardingGate,
{
    pub fn new(store: S, gate: G) -> Self {
        Self {
            store,
            gate: Arc::new(gate),
        }
    }

    pub fn create_slot(
        &self,
        actor: &Actor,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        meeting_type: MeetingType,
        message: String,
    ) -> Result<Slot> {
        if actor.role != Role::Advisor {
            return Err(Error::Authorization(
                "only advisors can publish slots".into(),
            ));
        }
        if starts_at >= ends_at {
            return Err(Error::Validation(
                "the slot must start before it ends".into(),
            ));
        }
        if message.chars().count() > MAX_SLOT_MESSAGE_LEN {
            return Err(Error::Validation(format!(
                "the slot note may not exceed {MAX_SLOT_MESSAGE_LEN} characters"
            )));
        }

        let slot = self.store.create_slot(NewSlot {
            advisor: actor.user.clone(),
            starts_at,
            ends_at,
            meeting_type,
            message,
        })?;
        tracing::info!(slot = %slot.id, advisor = %slot.advisor.email, "slot published");
        Ok(slot)
    }

    pub fn list_available(&self, filter: &SlotFilter) -> Result<Vec<Slot>> {
        self.store.list_available(filter)
    }

    /// Withdraws a slot. If the slot carried a confirmed booking, it is
    /// cancelled on behalf of the actor and the event is returned so the
    /// caller can notify the student.
    pub fn deactivate(&self, actor: &Actor, slot_id: Uuid) -> Result<Option<BookingEvent>> {
        let slot = self.store.get_slot(slot_id)?;
        let owns_slot = actor.role == Role::Advisor && slot.advisor.id == actor.user.id;
        if !owns_slot && actor.role != Role::Admin {
            return Err(Error::Authorization(
                "only the owning advisor or an admin can withdraw a slot".into(),
            ));
        }

        let cancelled = self.store.deactivate_slot(slot_id, actor.role)?;
        tracing::info!(slot = %slot_id, by = actor.role.as_str(), "slot withdrawn");
        Ok(cancelled.map(|booking| BookingEvent::Cancelled {
            booking,
            slot: Slot {
                active: false,
                ..slot
            },
        }))
    }

    pub fn book(
        &self,
        actor: &Actor,
        slot_id: Uuid,
        message: String,
    ) -> Result<(Booking, BookingEvent)> {
        if actor.role != Role::Student {
            return Err(Error::Authorization("only students can book slots".into()));
        }
        if !self.gate.is_onboarded(actor.user.id) {
            return Err(Error::Validation(
                "please complete the questionnaire before booking".into(),
            ));
        }

        let (booking, slot) = self
            .store
            .insert_booking(slot_id, actor.user.clone(), message)?;
        tracing::info!(
            booking = %booking.id,
            slot = %slot.id,
            student = %booking.student.email,
            "booking confirmed"
        );
        let event = BookingEvent::Confirmed {
            booking: booking.clone(),
            slot,
        };
        Ok((booking, event))
    }

    /// Cancels a booking. Idempotent: a second cancellation returns the
    /// stored terminal state without an event.
    pub fn cancel(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        message: String,
    ) -> Result<(Booking, Option<BookingEvent>)> {
        let (booking, slot) = self.store.get_booking(booking_id)?;
        self.authorize_party(actor, &booking, &slot, "cancel this booking")?;

        if !booking.is_confirmed() {
            return Ok((booking, None));
        }

        let message = message.trim().to_string();
        if message.is_empty() {
            return Err(Error::Validation(
                "a cancellation message is required".into(),
            ));
        }

        let (booking, slot) = self.store.cancel_booking(booking_id, actor.role, message)?;
        tracing::info!(
            booking = %booking.id,
            by = actor.role.as_str(),
            "booking cancelled"
        );
        let event = BookingEvent::Cancelled {
            booking: booking.clone(),
            slot,
        };
        Ok((booking, Some(event)))
    }

    pub fn list_for_user(&self, actor: &Actor, upcoming_only: bool) -> Result<Vec<(Booking, Slot)>> {
        self.store
            .list_for_user(actor.user.id, actor.role, upcoming_only)
    }

    /// Serialized calendar invite for a booking, restricted to the student,
    /// the slot's advisor and admins. Confirmed bookings export a REQUEST,
    /// cancelled ones a CANCEL with the same UID.
    pub fn booking_invite(&self, actor: &Actor, booking_id: Uuid) -> Result<(Booking, String)> {
        let (booking, slot) = self.store.get_booking(booking_id)?;
        self.authorize_party(actor, &booking, &slot, "download this event")?;
        let payload = ics::serialize(&ics::build_invite(&booking, &slot));
        Ok((booking, payload))
    }

    fn authorize_party(
        &self,
        actor: &Actor,
        booking: &Booking,
        slot: &Slot,
        action: &str,
    ) -> Result<()> {
        let permitted = match actor.role {
            Role::Admin => true,
            Role::Student => booking.student.id == actor.user.id,
            Role::Advisor => slot.advisor.id == actor.user.id,
        };
        if permitted {
            Ok(())
        } else {
            Err(Error::Authorization(format!(
                "you do not have permission to {action}"
            )))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::local_store::LocalStore;
    use crate::onboarding::{AssumeOnboarded, MockOnboardingGate};
    use crate::types::{BookingStatus, UserRef};
    use chrono::Duration;

    fn actor(role: Role) -> Actor {
        Actor {
            user: UserRef {
                id: Uuid::new_v4(),
                email: format!("{}@example.com", role.as_str()),
                name: String::new(),
            },
            role,
        }
    }

    fn engine() -> BookingEngine<LocalStore, AssumeOnboarded> {
        BookingEngine::new(LocalStore::default(), AssumeOnboarded)
    }

    fn publish(
        engine: &BookingEngine<LocalStore, impl OnboardingGate>,
        advisor: &Actor,
        offset_hours: i64,
    ) -> Slot {
        let starts_at = Utc::now() + Duration::hours(offset_hours);
        engine
            .create_slot(
                advisor,
                starts_at,
                starts_at + Duration::minutes(30),
                MeetingType::Online,
                String::new(),
            )
            .unwrap()
    }

    #[test]
    fn only_advisors_publish_slots() {
        let engine = engine();
        let starts_at = Utc::now() + Duration::hours(1);
        for role in [Role::Student, Role::Admin] {
            let err = engine
                .create_slot(
                    &actor(role),
                    starts_at,
                    starts_at + Duration::minutes(30),
                    MeetingType::Both,
                    String::new(),
                )
                .unwrap_err();
            assert!(matches!(err, Error::Authorization(_)));
        }
    }

    #[test]
    fn slot_must_start_before_it_ends() {
        let engine = engine();
        let starts_at = Utc::now() + Duration::hours(1);
        let err = engine
            .create_slot(
                &actor(Role::Advisor),
                starts_at,
                starts_at,
                MeetingType::Online,
                String::new(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn slot_note_length_is_capped() {
        let engine = engine();
        let starts_at = Utc::now() + Duration::hours(1);
        let err = engine
            .create_slot(
                &actor(Role::Advisor),
                starts_at,
                starts_at + Duration::minutes(30),
                MeetingType::Online,
                "x".repeat(201),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn booking_requires_student_role_and_onboarding() {
        let engine = engine();
        let advisor = actor(Role::Advisor);
        let slot = publish(&engine, &advisor, 24);

        let err = engine
            .book(&advisor, slot.id, String::new())
            .unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));

        let mut gate = MockOnboardingGate::new();
        gate.expect_is_onboarded().return_const(false);
        let gated = BookingEngine::new(LocalStore::default(), gate);
        let gated_advisor = actor(Role::Advisor);
        let slot = publish(&gated, &gated_advisor, 24);
        let err = gated
            .book(&actor(Role::Student), slot.id, String::new())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn booked_slot_conflicts_until_cancelled() {
        let engine = engine();
        let advisor = actor(Role::Advisor);
        let student_b = actor(Role::Student);
        let student_c = actor(Role::Student);
        let slot = publish(&engine, &advisor, 24);

        let (booking, event) = engine.book(&student_b, slot.id, String::new()).unwrap();
        assert!(matches!(event, BookingEvent::Confirmed { .. }));

        let err = engine
            .book(&student_c, slot.id, String::new())
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let (cancelled, event) = engine
            .cancel(&student_b, booking.id, "Can't make it".into())
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.cancelled_by, Some(Role::Student));
        assert!(event.is_some());

        // The freed slot is bookable again.
        engine.book(&student_c, slot.id, String::new()).unwrap();
    }

    #[test]
    fn cancel_is_idempotent() {
        let engine = engine();
        let advisor = actor(Role::Advisor);
        let student = actor(Role::Student);
        let slot = publish(&engine, &advisor, 24);
        let (booking, _) = engine.book(&student, slot.id, String::new()).unwrap();

        let (first, event) = engine
            .cancel(&student, booking.id, "Can't make it".into())
            .unwrap();
        assert!(event.is_some());

        let (second, event) = engine
            .cancel(&student, booking.id, "again".into())
            .unwrap();
        assert!(event.is_none());
        assert_eq!(first, second);
    }

    #[test]
    fn cancel_requires_a_message() {
        let engine = engine();
        let advisor = actor(Role::Advisor);
        let student = actor(Role::Student);
        let slot = publish(&engine, &advisor, 24);
        let (booking, _) = engine.book(&student, slot.id, String::new()).unwrap();

        let err = engine.cancel(&student, booking.id, "   ".into()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let (booking, _) = engine.booking_invite(&student, booking.id).unwrap();
        assert!(booking.is_confirmed());
    }

    #[test_case::test_case(Role::Student, false ; "other student rejected")]
    #[test_case::test_case(Role::Advisor, false ; "other advisor rejected")]
    #[test_case::test_case(Role::Admin, true ; "admin permitted")]
    fn cancel_authorization(role: Role, permitted: bool) {
        let engine = engine();
        let advisor = actor(Role::Advisor);
        let student = actor(Role::Student);
        let slot = publish(&engine, &advisor, 24);
        let (booking, _) = engine.book(&student, slot.id, String::new()).unwrap();

        let result = engine.cancel(&actor(role), booking.id, "reason".into());
        if permitted {
            result.unwrap();
        } else {
            assert!(matches!(result.unwrap_err(), Error::Authorization(_)));
        }
    }

    #[test]
    fn owning_parties_may_cancel() {
        let engine = engine();
        let advisor = actor(Role::Advisor);
        let student = actor(Role::Student);
        let slot = publish(&engine, &advisor, 24);
        let (booking, _) = engine.book(&student, slot.id, String::new()).unwrap();

        let (cancelled, _) = engine
            .cancel(&advisor, booking.id, "emergency".into())
            .unwrap();
        assert_eq!(cancelled.cancelled_by, Some(Role::Advisor));
    }

    #[test]
    fn deactivate_restricted_to_owner_or_admin() {
        let engine = engine();
        let owner = actor(Role::Advisor);
        let slot = publish(&engine, &owner, 24);

        let err = engine
            .deactivate(&actor(Role::Advisor), slot.id)
            .unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));

        assert!(engine.deactivate(&owner, slot.id).unwrap().is_none());
    }

    #[test]
    fn deactivating_booked_slot_emits_cancellation() {
        let engine = engine();
        let owner = actor(Role::Advisor);
        let student = actor(Role::Student);
        let slot = publish(&engine, &owner, 24);
        engine.book(&student, slot.id, String::new()).unwrap();

        let event = engine.deactivate(&actor(Role::Admin), slot.id).unwrap();
        match event {
            Some(BookingEvent::Cancelled { booking, slot }) => {
                assert_eq!(booking.cancelled_by, Some(Role::Admin));
                assert!(!slot.active);
            }
            other => panic!("expected a cancellation event, got {other:?}"),
        }
    }

    #[test]
    fn invite_download_restricted_to_tied_parties() {
        let engine = engine();
        let advisor = actor(Role::Advisor);
        let student = actor(Role::Student);
        let slot = publish(&engine, &advisor, 24);
        let (booking, _) = engine.book(&student, slot.id, String::new()).unwrap();

        for permitted in [&student, &advisor, &actor(Role::Admin)] {
            let (_, payload) = engine.booking_invite(permitted, booking.id).unwrap();
            assert!(payload.contains("METHOD:REQUEST"));
        }
        let err = engine
            .booking_invite(&actor(Role::Student), booking.id)
            .unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));
    }

    #[test]
    fn invite_exports_before_and_after_cancel_share_uid() {
        let engine = engine();
        let advisor = actor(Role::Advisor);
        let student = actor(Role::Student);
        let slot = publish(&engine, &advisor, 24);
        let (booking, _) = engine.book(&student, slot.id, String::new()).unwrap();

        let (_, request) = engine.booking_invite(&student, booking.id).unwrap();
        engine
            .cancel(&student, booking.id, "Can't make it".into())
            .unwrap();
        let (_, cancel) = engine.booking_invite(&student, booking.id).unwrap();

        let uid_line = format!("UID:booking-{}@advising", booking.id);
        assert!(request.contains(&uid_line));
        assert!(cancel.contains(&uid_line));
        assert!(request.contains("METHOD:REQUEST"));
        assert!(cancel.contains("METHOD:CANCEL"));
    }
}
