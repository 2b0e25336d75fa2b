use crate::notify::smtp::SmtpSettings;
use crate::notify::Recipient;

pub trait Configuration: Clone + Send + Sync + 'static {
    fn site_name(&self) -> String;
    fn bind_address(&self) -> String;
    fn database_url(&self) -> Option<String>;
    /// SMTP settings; `None` disables outbound email (notifications are
    /// logged only).
    fn smtp(&self) -> Option<SmtpSettings>;
    /// Admin addresses copied on every booking notification.
    fn admin_recipients(&self) -> Vec<Recipient>;
}
