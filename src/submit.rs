//! The intake path: validate, upload, persist, enqueue.
//!
//! Each step's failure aborts the rest and surfaces a distinct,
//! sanitized error; nothing here retries (the caller resubmits). The record
//! and its attachments are durably written *before* the job reference is
//! enqueued, so a worker can never observe a reference it cannot resolve.

use tracing::instrument;

use crate::queue::{JobQueue, JobReference, QueueError};
use crate::store::{
    Attachment, AttachmentStore, BlobStore, EmailFields, RecordKey, RecordStore, StoreError,
};

/// A caller's email draft, before it enters the durable pipeline.
///
/// `to` and `body` are required; the rest is optional. Address lists are
/// single delimited strings, as collected by the out-of-scope front-end.
#[derive(Debug, Clone, Default)]
pub struct EmailDraft {
    pub to: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: Option<String>,
    pub body: String,
}

impl From<EmailDraft> for EmailFields {
    fn from(draft: EmailDraft) -> Self {
        Self {
            to: draft.to,
            cc: draft.cc,
            bcc: draft.bcc,
            subject: draft.subject,
            body: draft.body,
        }
    }
}

/// Submission failure, mapped to an HTTP-style status code plus a short
/// message. Raw storage/transport detail never reaches the caller through
/// `Display`; it is logged here instead.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("the 'To' field in the email cannot be empty")]
    ToRecipientsEmpty,

    #[error("the email body cannot be empty")]
    BodyEmpty,

    #[error("could not write email to persistent storage; retry")]
    Storage(#[source] StoreError),

    #[error("could not notify workers to process email; retry")]
    Queue(#[source] QueueError),
}

impl SubmitError {
    /// HTTP-style status code for this failure.
    pub fn code(&self) -> u16 {
        match self {
            Self::ToRecipientsEmpty | Self::BodyEmpty => 400,
            Self::Storage(_) | Self::Queue(_) => 503,
        }
    }
}

/// The submission path, holding one shared client per collaborator.
///
/// Construct once at startup and share (it is a cheap `Clone`); all emails
/// are written under the configured `sender` identity, not the caller's.
#[derive(Clone)]
pub struct Submitter<B: BlobStore, R: RecordStore, Q: JobQueue> {
    attachments: AttachmentStore<B>,
    records: R,
    queue: Q,
    sender: String,
}

impl<B: BlobStore, R: RecordStore, Q: JobQueue> Submitter<B, R, Q> {
    pub fn new(
        attachments: AttachmentStore<B>,
        records: R,
        queue: Q,
        sender: impl Into<String>,
    ) -> Self {
        Self {
            attachments,
            records,
            queue,
            sender: sender.into(),
        }
    }

    /// Accept a draft into the durable pipeline.
    ///
    /// Uploads attachments, writes the email record (`sent == false`), and
    /// enqueues a [`JobReference`] for the workers. Returns the record key on
    /// success; on failure, which stage failed.
    #[instrument(skip_all, fields(sender = %self.sender))]
    pub async fn submit(
        &self,
        draft: EmailDraft,
        files: Vec<Attachment>,
    ) -> Result<RecordKey, SubmitError> {
        validate(&draft)?;

        let refs = self.attachments.write(files).await.map_err(|e| {
            tracing::error!(error = %e, "attachment upload failed");
            SubmitError::Storage(e)
        })?;

        let key = self
            .records
            .write(&self.sender, draft.into(), refs.clone())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "record write failed");
                SubmitError::Storage(e)
            })?;

        let job = JobReference::new(&key, refs);
        self.queue.enqueue(&job).await.map_err(|e| {
            // The record exists but will never be processed unless an
            // operator re-enqueues it; reconciliation is out of scope.
            tracing::error!(error = %e, record_id = %key.id, "enqueue failed");
            SubmitError::Queue(e)
        })?;

        tracing::info!(record_id = %key.id, "email accepted for delivery");
        Ok(key)
    }
}

fn validate(draft: &EmailDraft) -> Result<(), SubmitError> {
    if draft.to.trim().is_empty() {
        return Err(SubmitError::ToRecipientsEmpty);
    }
    if draft.body.is_empty() {
        return Err(SubmitError::BodyEmpty);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryJobQueue;
    use crate::store::{MemoryBlobStore, MemoryRecordStore};

    fn submitter() -> Submitter<MemoryBlobStore, MemoryRecordStore, MemoryJobQueue> {
        Submitter::new(
            AttachmentStore::new(MemoryBlobStore::new()),
            MemoryRecordStore::new(),
            MemoryJobQueue::new(),
            "noreply@example.com",
        )
    }

    #[tokio::test]
    async fn missing_recipients_fails_validation() {
        let err = submitter()
            .submit(
                EmailDraft {
                    body: "hi".to_string(),
                    ..Default::default()
                },
                Vec::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::ToRecipientsEmpty));
        assert_eq!(err.code(), 400);
    }

    #[tokio::test]
    async fn empty_body_fails_validation() {
        let err = submitter()
            .submit(
                EmailDraft {
                    to: "a@x.com".to_string(),
                    ..Default::default()
                },
                Vec::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::BodyEmpty));
    }

    #[tokio::test]
    async fn submit_writes_record_under_configured_sender() {
        let records = MemoryRecordStore::new();
        let queue = MemoryJobQueue::new();
        let submitter = Submitter::new(
            AttachmentStore::new(MemoryBlobStore::new()),
            records.clone(),
            queue.clone(),
            "noreply@example.com",
        );

        let key = submitter
            .submit(
                EmailDraft {
                    to: "a@x.com".to_string(),
                    body: "hi".to_string(),
                    ..Default::default()
                },
                Vec::new(),
            )
            .await
            .unwrap();

        assert_eq!(key.sender, "noreply@example.com");
        assert!(!records.read(&key).await.unwrap().unwrap().sent);
        assert_eq!(queue.len().await, 1);
    }
}
