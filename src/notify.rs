//! Booking notifications.
//!
//! The dispatcher turns booking lifecycle events into emails for the student,
//! the advisor and the configured admin addresses, attaching the calendar
//! invite. Delivery is best-effort: the booking state change has already been
//! committed by the time an event reaches this module, so a transport failure
//! is logged and swallowed.

use crate::error::TransportError;
use crate::ics;
use crate::types::{BookingEvent, Role, Slot, UserRef};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub email: String,
    pub name: String,
}

impl Recipient {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.email
        } else {
            &self.name
        }
    }
}

impl From<&UserRef> for Recipient {
    fn from(user: &UserRef) -> Self {
        Recipient {
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

/// Calendar file attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteAttachment {
    pub filename: String,
    pub content: String,
}

/// Outbound message sink. The SMTP implementation lives below; tests swap in
/// a recording double.
pub trait NotificationTransport: Send + Sync + 'static {
    fn send(
        &self,
        to: &Recipient,
        subject: &str,
        body: &str,
        attachment: Option<&InviteAttachment>,
    ) -> Result<(), TransportError>;
}

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn NotificationTransport>,
    admins: Vec<Recipient>,
    site_name: String,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn NotificationTransport>,
        admins: Vec<Recipient>,
        site_name: String,
    ) -> Self {
        Self {
            transport,
            admins,
            site_name,
        }
    }

    pub fn dispatch(&self, event: &BookingEvent) {
        let (subject, body, booking, slot) = match event {
            BookingEvent::Confirmed { booking, slot } => (
                "Booking confirmed",
                format!(
                    "Your {} appointment with {} on {} has been scheduled.",
                    slot.meeting_type.display(),
                    slot.advisor.display_name(),
                    when(slot),
                ),
                booking,
                slot,
            ),
            BookingEvent::Cancelled { booking, slot } => {
                let by = booking
                    .cancelled_by
                    .map(|role| role.as_str())
                    .unwrap_or("unknown");
                let mut body = format!(
                    "The {} appointment between {} and {} on {} was cancelled by the {}.",
                    slot.meeting_type.display(),
                    booking.student.display_name(),
                    slot.advisor.display_name(),
                    when(slot),
                    by,
                );
                if !booking.cancellation_message.is_empty() {
                    body.push_str("\n\nMessage: ");
                    body.push_str(&booking.cancellation_message);
                }
                ("Booking cancelled", body, booking, slot)
            }
        };

        let body = format!("{body}\n\n-- {}", self.site_name);

        let attachment = InviteAttachment {
            filename: format!("booking-{}.ics", booking.id),
            content: ics::serialize(&ics::build_invite(booking, slot)),
        };

        let mut recipients: Vec<Recipient> =
            vec![(&booking.student).into(), (&slot.advisor).into()];
        recipients.extend(self.admins.iter().cloned());

        for recipient in &recipients {
            if recipient.email.is_empty() {
                continue;
            }
            if let Err(err) =
                self.transport
                    .send(recipient, subject, &body, Some(&attachment))
            {
                tracing::warn!(
                    to = %recipient.email,
                    booking = %booking.id,
                    error = %err,
                    "notification send failed"
                );
            }
        }
    }
}

fn when(slot: &Slot) -> String {
    slot.starts_at.format("%B %d, %Y at %H:%M UTC").to_string()
}

/// Fallback transport when no SMTP host is configured: notifications are
/// visible in the logs but nothing leaves the process.
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

impl NotificationTransport for LogTransport {
    fn send(
        &self,
        to: &Recipient,
        subject: &str,
        _body: &str,
        attachment: Option<&InviteAttachment>,
    ) -> Result<(), TransportError> {
        tracing::info!(
            to = %to.email,
            subject,
            attachment = attachment.map(|a| a.filename.as_str()),
            "email suppressed (no SMTP configured)"
        );
        Ok(())
    }
}

pub mod smtp {
    use super::{InviteAttachment, NotificationTransport, Recipient};
    use crate::error::TransportError;
    use lettre::message::header::ContentType;
    use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
    use lettre::transport::smtp::authentication::Credentials;
    use lettre::{Address, Message, SmtpTransport, Transport};

    #[derive(Debug, Clone)]
    pub struct SmtpSettings {
        pub host: String,
        pub port: u16,
        pub username: Option<String>,
        pub password: Option<String>,
        pub from: String,
    }

    /// SMTP-backed transport. Connection problems surface as
    /// `TransportError` per send; the dispatcher decides what to do with
    /// them (log and continue).
    pub struct SmtpNotifier {
        transport: SmtpTransport,
        from: Mailbox,
    }

    impl SmtpNotifier {
        pub fn new(settings: &SmtpSettings) -> Result<Self, TransportError> {
            let mut builder =
                SmtpTransport::builder_dangerous(settings.host.as_str()).port(settings.port);
            if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
                builder = builder.credentials(Credentials::new(
                    username.clone(),
                    password.clone(),
                ));
            }
            let from = settings
                .from
                .parse::<Mailbox>()
                .map_err(|err| TransportError(format!("invalid from address: {err}")))?;
            Ok(Self {
                transport: builder.build(),
                from,
            })
        }
    }

    impl NotificationTransport for SmtpNotifier {
        fn send(
            &self,
            to: &Recipient,
            subject: &str,
            body: &str,
            attachment: Option<&InviteAttachment>,
        ) -> Result<(), TransportError> {
            let address = to
                .email
                .parse::<Address>()
                .map_err(|err| TransportError(format!("invalid recipient: {err}")))?;
            let mailbox = Mailbox::new(
                (!to.name.is_empty()).then(|| to.name.clone()),
                address,
            );

            let builder = Message::builder()
                .from(self.from.clone())
                .to(mailbox)
                .subject(subject);

            let message = match attachment {
                Some(invite) => {
                    let content_type = ContentType::parse("text/calendar; charset=utf-8")
                        .map_err(|err| TransportError(err.to_string()))?;
                    builder.multipart(
                        MultiPart::mixed()
                            .singlepart(SinglePart::plain(body.to_string()))
                            .singlepart(
                                Attachment::new(invite.filename.clone())
                                    .body(invite.content.clone(), content_type),
                            ),
                    )
                }
                None => builder.body(body.to_string()),
            }
            .map_err(|err| TransportError(err.to_string()))?;

            self.transport
                .send(&message)
                .map_err(|err| TransportError(err.to_string()))?;
            Ok(())
        }
    }
}
