// Diesel table definitions. Kept in sync with `migrations/` by hand; the
// partial unique index backing the one-confirmed-booking-per-slot invariant
// lives only in SQL (diesel does not model partial indexes).

diesel::table! {
    slots (id) {
        id -> Uuid,
        advisor_id -> Uuid,
        advisor_email -> Text,
        advisor_name -> Text,
        starts_at -> Timestamptz,
        ends_at -> Timestamptz,
        active -> Bool,
        meeting_type -> Text,
        message -> Text,
    }
}

diesel::table! {
    bookings (id) {
        id -> Uuid,
        slot_id -> Uuid,
        student_id -> Uuid,
        student_email -> Text,
        student_name -> Text,
        message -> Text,
        status -> Text,
        created_at -> Timestamptz,
        cancelled_at -> Nullable<Timestamptz>,
        cancelled_by -> Nullable<Text>,
        cancellation_message -> Text,
    }
}

diesel::joinable!(bookings -> slots (slot_id));
diesel::allow_tables_to_appear_in_same_query!(slots, bookings);
