//! Durable background email delivery.
//!
//! Submitting an email and delivering it are decoupled: [`Submitter::submit`]
//! uploads attachments, persists a metadata record, and enqueues a small
//! [`JobReference`] — then returns. A [`Worker`] pump pulls references from
//! the queue, resolves the record and attachments, and hands a composed
//! message to a [`Mailer`] for transmission, acknowledging the queue message
//! only afterwards.
//!
//! # Architecture
//!
//! - [`store::AttachmentStore`] — blob storage for uploaded files, with a
//!   concurrent bounded fan-out on upload and a collated reference string.
//! - [`store::RecordStore`] — durable table of email metadata keyed by
//!   `(sender, id)`, including a monotonic `sent` flag.
//! - [`queue::JobQueue`] — at-least-once transport for job references with
//!   explicit complete/abandon acknowledgment.
//! - [`Submitter`] — the intake path: validate, upload, persist, enqueue.
//! - [`Worker`] — the delivery loop: resolve, compose, send, mark sent, ack.
//!
//! All storage and queue clients are cheap to clone (shared state behind an
//! `Arc`) and safe for unsynchronized concurrent use; construct each once at
//! startup and hand clones to the submitter and worker.
//!
//! # Quick start
//!
//! ```ignore
//! let blobs = FsBlobStore::new("/var/lib/mailspool/attachments");
//! let records = MemoryRecordStore::new();
//! let queue = MemoryJobQueue::new();
//! let mailer = SmtpMailer::for_provider(MailProvider::SendGrid)?;
//!
//! let submitter = Submitter::new(
//!     AttachmentStore::new(blobs.clone()),
//!     records.clone(),
//!     queue.clone(),
//!     "noreply@example.com",
//! );
//! let handle = Worker::new(queue, records, blobs, mailer).start();
//!
//! submitter.submit(draft, files).await?;
//! // ... on SIGTERM:
//! handle.shutdown().await;
//! ```

pub mod config;
pub mod mail;
pub mod queue;
pub mod store;
pub mod submit;
pub mod worker;

pub use config::{EnvConfig, PipelineConfig};
pub use mail::{Email, MailProvider, Mailer, SmtpMailer};
pub use queue::{JobQueue, JobReference, MemoryJobQueue};
pub use store::{AttachmentStore, FsBlobStore, MemoryRecordStore, RecordKey};
pub use submit::{EmailDraft, SubmitError, Submitter};
pub use worker::{shutdown_signal, Worker, WorkerHandle};
