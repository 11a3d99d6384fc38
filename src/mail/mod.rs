//! Message composition and SMTP transmission.
//!
//! A thin abstraction over [lettre](https://lettre.rs): [`Email`] is the
//! composed message, [`Mailer`] the transmission seam the worker calls
//! through, and [`SmtpMailer`] the production implementation. Each
//! [`MailProvider`] resolves to its own relay host and credentials,
//! configured out-of-band through prefixed environment variables.
//!
//! # Environment Variables
//!
//! [`SmtpMailer::for_provider`] reads, under the provider's prefix
//! (`SENDGRID_` or `AMAZON_`):
//!
//! | Variable | Required | Description |
//! |----------|----------|-------------|
//! | `HOST` | Yes | SMTP relay hostname |
//! | `USERNAME` | No | Username for authentication |
//! | `PASSWORD` | No | Password for authentication |
//! | `USE_TLS` | No | Encrypted transport via STARTTLS (default: true) |
//! | `TIMEOUT` | No | Connection timeout in seconds (default: 10) |
//!
//! The submission port is fixed at 587.

mod mailer;
mod message;

pub use mailer::{MailProvider, Mailer, MailerConfig, SmtpMailer, SUBMISSION_PORT};
pub use message::{AttachmentPart, Email, EmailBuilder};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("missing required config: {0}")]
    MissingConfig(String),

    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(String),
}
