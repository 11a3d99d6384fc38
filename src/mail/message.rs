//! Email message types and builder.

use serde::{Deserialize, Serialize};

use super::MailError;

/// A file attached to an outgoing message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentPart {
    pub filename: String,
    pub content: Vec<u8>,
}

impl AttachmentPart {
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content,
        }
    }
}

/// A complete email message ready to send.
///
/// The body is plain text; the subject is optional (a subjectless message is
/// legal and transmitted as such).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    /// Sender address.
    pub from: String,
    /// Primary recipients.
    pub to: Vec<String>,
    /// Carbon copy recipients.
    #[serde(default)]
    pub cc: Vec<String>,
    /// Blind carbon copy recipients.
    #[serde(default)]
    pub bcc: Vec<String>,
    /// Optional subject line.
    #[serde(default)]
    pub subject: Option<String>,
    /// Plain-text body.
    pub body: String,
    /// File attachments.
    #[serde(default)]
    pub attachments: Vec<AttachmentPart>,
}

impl Email {
    /// Create a new email builder.
    pub fn builder() -> EmailBuilder {
        EmailBuilder::default()
    }
}

/// Builder for constructing [`Email`] instances.
#[derive(Debug, Default)]
pub struct EmailBuilder {
    from: Option<String>,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    subject: Option<String>,
    body: Option<String>,
    attachments: Vec<AttachmentPart>,
}

impl EmailBuilder {
    /// Set the sender address (required).
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    /// Add a primary recipient.
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    /// Add multiple primary recipients.
    pub fn to_many(mut self, addresses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.to.extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Add a CC recipient.
    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    /// Add multiple CC recipients.
    pub fn cc_many(mut self, addresses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cc.extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Add a BCC recipient.
    pub fn bcc(mut self, address: impl Into<String>) -> Self {
        self.bcc.push(address.into());
        self
    }

    /// Add multiple BCC recipients.
    pub fn bcc_many(mut self, addresses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.bcc.extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Set the subject line (optional).
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the plain-text body (required).
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Attach a file.
    pub fn attachment(mut self, part: AttachmentPart) -> Self {
        self.attachments.push(part);
        self
    }

    /// Build the email, validating required fields.
    pub fn build(self) -> Result<Email, MailError> {
        if self.to.is_empty() {
            return Err(MailError::Build("at least one recipient required".into()));
        }

        let from = self
            .from
            .ok_or_else(|| MailError::Build("from address required".into()))?;

        let body = self
            .body
            .ok_or_else(|| MailError::Build("body required".into()))?;

        Ok(Email {
            from,
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            subject: self.subject,
            body,
            attachments: self.attachments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_minimal_email() {
        let email = Email::builder()
            .from("sender@example.com")
            .to("user@example.com")
            .body("Body text")
            .build()
            .unwrap();

        assert_eq!(email.from, "sender@example.com");
        assert_eq!(email.to, vec!["user@example.com"]);
        assert!(email.subject.is_none());
        assert_eq!(email.body, "Body text");
        assert!(email.attachments.is_empty());
    }

    #[test]
    fn build_with_optional_fields() {
        let email = Email::builder()
            .from("sender@example.com")
            .to("a@b.com")
            .cc("c@b.com")
            .bcc("d@b.com")
            .subject("Test")
            .body("Plain")
            .attachment(AttachmentPart::new("a.txt", b"abc".to_vec()))
            .build()
            .unwrap();

        assert_eq!(email.subject.as_deref(), Some("Test"));
        assert_eq!(email.cc, vec!["c@b.com"]);
        assert_eq!(email.bcc, vec!["d@b.com"]);
        assert_eq!(email.attachments.len(), 1);
    }

    #[test]
    fn build_requires_from() {
        let result = Email::builder().to("a@b.com").body("Body").build();
        assert!(result.is_err());
    }

    #[test]
    fn build_requires_recipient() {
        let result = Email::builder().from("a@b.com").body("Body").build();
        assert!(result.is_err());
    }

    #[test]
    fn build_requires_body() {
        let result = Email::builder().from("a@b.com").to("a@b.com").build();
        assert!(result.is_err());
    }
}
