use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::bot_services::{Envelope, Mailer};

pub const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Clone, PartialEq, Eq)]
/// STARTTLS relay used for follow-up emails.
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Sender mailbox, e.g. `Charles <charles@example.com>`.
    pub from: String,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

impl SmtpSettings {
    /// Host, username and password are required; the sender defaults to the username.
    pub fn from_parts(
        host: Option<String>,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        from: Option<String>,
    ) -> Option<Self> {
        let clean = |value: Option<String>| {
            value
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let username = clean(username)?;
        Some(Self {
            host: clean(host)?,
            port,
            password: clean(password)?,
            from: clean(from).unwrap_or_else(|| username.clone()),
            username,
        })
    }
}

/// Plain-text message from `from` to the envelope's recipient.
pub fn compose_message(from: &Mailbox, envelope: &Envelope) -> Result<Message> {
    let to: Mailbox = envelope
        .to
        .parse()
        .with_context(|| format!("invalid recipient '{}'", envelope.to))?;
    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(envelope.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(envelope.body.clone())
        .context("failed to build email")
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings, timeout_ms: u64) -> Result<Self> {
        let from: Mailbox = settings
            .from
            .parse()
            .with_context(|| format!("invalid sender '{}'", settings.from))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .with_context(|| format!("invalid smtp relay '{}'", settings.host))?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .timeout(Some(Duration::from_millis(timeout_ms.max(1))))
            .build();
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, envelope: &Envelope) -> Result<()> {
        let message = compose_message(&self.from, envelope)?;
        self.transport
            .send(message)
            .await
            .with_context(|| format!("smtp delivery to {} failed", envelope.to))?;
        tracing::info!(to = %envelope.to, subject = %envelope.subject, "email sent");
        Ok(())
    }
}
