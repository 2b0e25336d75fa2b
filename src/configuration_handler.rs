use crate::configuration::Configuration;
use crate::notify::smtp::SmtpSettings;
use crate::notify::Recipient;

/// Environment-backed configuration. `main` loads `.env` via dotenvy before
/// constructing this.
#[derive(Clone)]
pub struct EnvConfiguration {
    port: Option<u16>,
}

impl EnvConfiguration {
    pub fn new(port: Option<u16>) -> Self {
        Self { port }
    }
}

impl Configuration for EnvConfiguration {
    fn site_name(&self) -> String {
        std::env::var("SITE_NAME").unwrap_or_else(|_| "Advising".into())
    }

    fn bind_address(&self) -> String {
        let port = self
            .port
            .or_else(|| {
                std::env::var("PORT")
                    .ok()
                    .and_then(|value| value.parse().ok())
            })
            .unwrap_or(3000);
        format!("127.0.0.1:{port}")
    }

    fn database_url(&self) -> Option<String> {
        std::env::var("DATABASE_URL").ok()
    }

    fn smtp(&self) -> Option<SmtpSettings> {
        let host = std::env::var("SMTP_HOST").ok()?;
        Some(SmtpSettings {
            host,
            port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(25),
            username: std::env::var("SMTP_USER").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "noreply@advising.local".into()),
        })
    }

    fn admin_recipients(&self) -> Vec<Recipient> {
        std::env::var("ADMIN_EMAILS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(|email| Recipient {
                email: email.to_string(),
                name: String::new(),
            })
            .collect()
    }
}
