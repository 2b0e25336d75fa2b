//! Calendar export.
//!
//! Builds an RFC 5545 invitation from a booking and its slot. The output is a
//! pure function of the two records: DTSTAMP comes from the booking's own
//! timestamps rather than the wall clock, so repeated downloads are
//! byte-identical, and the UID is derived from the booking id so a later
//! CANCEL targets the same calendar event instead of duplicating it.

use crate::types::{Booking, Slot, UserRef};
use chrono::{DateTime, Utc};

const PRODID: &str = "-//Advising//EN";
const MAX_LINE_OCTETS: usize = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteMethod {
    Request,
    Cancel,
}

impl InviteMethod {
    fn as_str(&self) -> &'static str {
        match self {
            InviteMethod::Request => "REQUEST",
            InviteMethod::Cancel => "CANCEL",
        }
    }
}

/// Derived calendar representation of a booking. Not persisted; regenerable
/// at any time from the booking and slot records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    pub uid: String,
    pub method: InviteMethod,
    pub sequence: u32,
    pub dtstamp: DateTime<Utc>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub organizer: UserRef,
    pub attendee: UserRef,
    pub summary: String,
    pub description: String,
}

pub fn build_invite(booking: &Booking, slot: &Slot) -> Invite {
    let mut description_lines = vec![
        format!("Student: {}", booking.student.display_name()),
        format!("Advisor: {}", slot.advisor.display_name()),
        format!("Meeting: {}", slot.meeting_type.display()),
    ];
    if !slot.message.is_empty() {
        description_lines.push(format!("Advisor note: {}", slot.message));
    }
    if !booking.message.is_empty() {
        description_lines.push(format!("Student note: {}", booking.message));
    }

    let (method, sequence, dtstamp) = if booking.is_confirmed() {
        (InviteMethod::Request, 0, booking.created_at)
    } else {
        if !booking.cancellation_message.is_empty() {
            description_lines.push(format!(
                "Cancellation note: {}",
                booking.cancellation_message
            ));
        }
        (
            InviteMethod::Cancel,
            1,
            booking.cancelled_at.unwrap_or(booking.created_at),
        )
    };

    Invite {
        uid: format!("booking-{}@advising", booking.id),
        method,
        sequence,
        dtstamp,
        starts_at: slot.starts_at,
        ends_at: slot.ends_at,
        organizer: slot.advisor.clone(),
        attendee: booking.student.clone(),
        summary: format!("Session with {}", slot.advisor.display_name()),
        description: description_lines.join("\n"),
    }
}

pub fn serialize(invite: &Invite) -> String {
    let status = match invite.method {
        InviteMethod::Request => "CONFIRMED",
        InviteMethod::Cancel => "CANCELLED",
    };
    let lines = [
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{PRODID}"),
        format!("METHOD:{}", invite.method.as_str()),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}", invite.uid),
        format!("SEQUENCE:{}", invite.sequence),
        format!("DTSTAMP:{}", format_utc(invite.dtstamp)),
        format!("DTSTART:{}", format_utc(invite.starts_at)),
        format!("DTEND:{}", format_utc(invite.ends_at)),
        format!(
            "ORGANIZER;CN={}:mailto:{}",
            param_value(invite.organizer.display_name()),
            invite.organizer.email
        ),
        format!(
            "ATTENDEE;CN={}:mailto:{}",
            param_value(invite.attendee.display_name()),
            invite.attendee.email
        ),
        format!("SUMMARY:{}", escape_text(&invite.summary)),
        format!("DESCRIPTION:{}", escape_text(&invite.description)),
        format!("STATUS:{status}"),
        "END:VEVENT".to_string(),
        "END:VCALENDAR".to_string(),
    ];

    let mut out = String::new();
    for line in &lines {
        fold_line(line, &mut out);
    }
    out
}

fn format_utc(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

/// TEXT value escaping per RFC 5545 §3.3.11.
fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Parameter value encoding per RFC 5545 §3.2: parameter values are not
/// backslash-escaped; a value containing ':', ';' or ',' is DQUOTE-quoted
/// instead. DQUOTE and CR/LF cannot appear in a value and are dropped.
fn param_value(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| !matches!(c, '"' | '\r' | '\n'))
        .collect();
    if cleaned.chars().any(|c| matches!(c, ':' | ';' | ',')) {
        format!("\"{cleaned}\"")
    } else {
        cleaned
    }
}

/// Content line folding per RFC 5545 §3.1: no line longer than 75 octets,
/// continuations start with CRLF followed by one space. Splits stay on UTF-8
/// character boundaries, counting octets rather than characters.
fn fold_line(line: &str, out: &mut String) {
    let mut budget = MAX_LINE_OCTETS;
    let mut used = 0;
    for c in line.chars() {
        let width = c.len_utf8();
        if used + width > budget {
            out.push_str("\r\n ");
            // Continuation lines lose one octet to the leading space.
            budget = MAX_LINE_OCTETS - 1;
            used = 0;
        }
        out.push(c);
        used += width;
    }
    out.push_str("\r\n");
}
