//! Mailer trait and SMTP implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};

use crate::config::EnvConfig;

use super::{Email, MailError};

/// The fixed SMTP submission port.
pub const SUBMISSION_PORT: u16 = 587;

/// Async email sending trait.
///
/// The worker hands every composed message to a `Mailer`; implement this
/// trait to provide alternative backends (or a capture mock in tests).
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    /// Transmit an email.
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

/// External relay services this pipeline can hand mail to.
///
/// Each provider resolves to its own host and credentials, configured
/// out-of-band under the provider's environment prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailProvider {
    Amazon,
    SendGrid,
}

impl MailProvider {
    fn env_prefix(self) -> &'static str {
        match self {
            Self::Amazon => "AMAZON",
            Self::SendGrid => "SENDGRID",
        }
    }
}

/// Configuration for one SMTP relay.
#[derive(Debug, Clone, Deserialize)]
pub struct MailerConfig {
    /// SMTP relay hostname.
    pub host: String,

    /// Username for authentication.
    pub username: Option<String>,

    /// Password for authentication.
    pub password: Option<String>,

    /// Use encrypted transport (STARTTLS). Default: true.
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,

    /// Connection timeout in seconds (default: 10).
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_use_tls() -> bool {
    true
}

fn default_timeout() -> u64 {
    10
}

/// SMTP-based mailer using lettre.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpMailer {
    /// Create a mailer for a provider from environment variables.
    ///
    /// Reads `HOST`, `USERNAME`, `PASSWORD`, `USE_TLS`, `TIMEOUT` under the
    /// provider's prefix (e.g. `SENDGRID_HOST`).
    pub fn for_provider(provider: MailProvider) -> Result<Self, MailError> {
        dotenvy::dotenv().ok();

        let config = MailerConfig::from_env_with_prefix(provider.env_prefix())
            .map_err(|e| MailError::MissingConfig(e.to_string()))?;

        Self::from_config(config)
    }

    /// Create a mailer from environment variables under the `SMTP_` prefix.
    pub fn from_env() -> Result<Self, MailError> {
        dotenvy::dotenv().ok();

        let config = MailerConfig::from_env_with_prefix("SMTP")
            .map_err(|e| MailError::MissingConfig(e.to_string()))?;

        Self::from_config(config)
    }

    /// Create a mailer from explicit configuration.
    pub fn from_config(config: MailerConfig) -> Result<Self, MailError> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| MailError::Smtp(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        builder = builder
            .port(SUBMISSION_PORT)
            .timeout(Some(Duration::from_secs(config.timeout)));

        if let (Some(username), Some(password)) = (config.username, config.password) {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: Arc::new(builder.build()),
        })
    }

    /// Build a lettre Message from our Email type.
    fn build_message(&self, email: &Email) -> Result<Message, MailError> {
        let from: Mailbox = email
            .from
            .parse()
            .map_err(|_| MailError::InvalidAddress(email.from.clone()))?;

        let mut builder = Message::builder().from(from);

        for to in &email.to {
            let mailbox: Mailbox = to
                .parse()
                .map_err(|_| MailError::InvalidAddress(to.clone()))?;
            builder = builder.to(mailbox);
        }

        for cc in &email.cc {
            let mailbox: Mailbox = cc
                .parse()
                .map_err(|_| MailError::InvalidAddress(cc.clone()))?;
            builder = builder.cc(mailbox);
        }

        for bcc in &email.bcc {
            let mailbox: Mailbox = bcc
                .parse()
                .map_err(|_| MailError::InvalidAddress(bcc.clone()))?;
            builder = builder.bcc(mailbox);
        }

        if let Some(subject) = &email.subject {
            builder = builder.subject(subject);
        }

        let message = if email.attachments.is_empty() {
            builder
                .body(email.body.clone())
                .map_err(|e| MailError::Build(e.to_string()))?
        } else {
            let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(email.body.clone()));
            for part in &email.attachments {
                multipart = multipart.singlepart(
                    Attachment::new(part.filename.clone()).body(
                        Body::new(part.content.clone()),
                        ContentType::parse("application/octet-stream")
                            .map_err(|e| MailError::Build(e.to_string()))?,
                    ),
                );
            }
            builder
                .multipart(multipart)
                .map_err(|e| MailError::Build(e.to_string()))?
        };

        Ok(message)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let message = self.build_message(email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::AttachmentPart;

    fn mailer() -> SmtpMailer {
        SmtpMailer::from_config(MailerConfig {
            host: "smtp.example.com".to_string(),
            username: None,
            password: None,
            use_tls: false,
            timeout: 10,
        })
        .unwrap()
    }

    #[test]
    fn builds_plain_message_without_subject() {
        let email = Email::builder()
            .from("s@example.com")
            .to("a@example.com")
            .body("hi")
            .build()
            .unwrap();

        let message = mailer().build_message(&email).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("hi"));
        assert!(!raw.contains("Subject:"));
    }

    #[test]
    fn builds_multipart_message_with_attachment() {
        let email = Email::builder()
            .from("s@example.com")
            .to("a@example.com")
            .subject("files")
            .body("see attached")
            .attachment(AttachmentPart::new("a.txt", b"payload".to_vec()))
            .build()
            .unwrap();

        let message = mailer().build_message(&email).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: files"));
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("a.txt"));
    }

    #[test]
    fn invalid_address_is_rejected() {
        let email = Email::builder()
            .from("s@example.com")
            .to("not-an-address")
            .body("hi")
            .build()
            .unwrap();

        let err = mailer().build_message(&email).unwrap_err();
        assert!(matches!(err, MailError::InvalidAddress(a) if a == "not-an-address"));
    }
}
