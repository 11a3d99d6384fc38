//! The delivery loop: resolve, compose, send, mark sent, acknowledge.
//!
//! A [`Worker`] is a long-lived pump over a [`JobQueue`]. Each leased message
//! is processed on its own task, bounded by a concurrency semaphore; distinct
//! messages run in parallel while the queue's exclusive lease keeps two
//! consumers off the same message. The worker holds no durable state of its
//! own — everything lives in the record store, so any number of worker
//! processes can share one queue.
//!
//! Acknowledgment rules, per message:
//!
//! - payload does not parse as a [`JobReference`] → completed (retrying
//!   cannot fix a malformed message);
//! - record missing → completed with an error log (retrying cannot make a
//!   missing durable record appear);
//! - record already `sent` → completed without composing or sending;
//! - transport success → the record is marked sent *before* the message is
//!   completed, so redelivery after a crash between send and ack is skipped
//!   instead of resent;
//! - any transient failure (storage read, transport) → abandoned for
//!   redelivery; the pump never crashes on a single bad message.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::Instrument;

use crate::mail::{AttachmentPart, Email, MailError, Mailer};
use crate::queue::{Delivery, JobQueue, JobReference, QueueError};
use crate::store::{split_refs, AttachmentStore, BlobStore, RecordStore, StoreError};

/// A failure while resolving or transmitting one email; the message it came
/// from is abandoned for redelivery.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal state of one processed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Sent,
    AlreadySent,
    RecordMissing,
}

/// Email delivery pump over any [`JobQueue`].
///
/// ```ignore
/// let handle = Worker::new(queue, records, blobs, mailer)
///     .concurrency(8)
///     .poll_interval(Duration::from_millis(500))
///     .start();
/// // on shutdown: stop intake, drain in-flight messages
/// handle.shutdown().await;
/// ```
pub struct Worker<Q: JobQueue, R: RecordStore, B: BlobStore, M: Mailer> {
    queue: Q,
    records: R,
    attachments: AttachmentStore<B>,
    mailer: Arc<M>,
    concurrency: usize,
    poll_interval: Duration,
    scratch_dir: PathBuf,
    worker_id: String,
}

impl<Q: JobQueue, R: RecordStore, B: BlobStore, M: Mailer> Clone for Worker<Q, R, B, M> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            records: self.records.clone(),
            attachments: self.attachments.clone(),
            mailer: self.mailer.clone(),
            concurrency: self.concurrency,
            poll_interval: self.poll_interval,
            scratch_dir: self.scratch_dir.clone(),
            worker_id: self.worker_id.clone(),
        }
    }
}

impl<Q: JobQueue, R: RecordStore, B: BlobStore, M: Mailer> Worker<Q, R, B, M> {
    pub fn new(queue: Q, records: R, blobs: B, mailer: M) -> Self {
        Self {
            queue,
            records,
            attachments: AttachmentStore::new(blobs),
            mailer: Arc::new(mailer),
            concurrency: 4,
            poll_interval: Duration::from_secs(1),
            scratch_dir: std::env::temp_dir(),
            worker_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Maximum number of messages processed in parallel (default: 4).
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// How often to poll when idle (default: 1s). Backs off slightly during
    /// idle streaks.
    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.poll_interval = d;
        self
    }

    /// Local directory attachments are downloaded into before composing
    /// (default: the system temp dir).
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Start the pump loop on a background task.
    ///
    /// Returns a [`WorkerHandle`]; dropping it detaches the worker, while
    /// [`WorkerHandle::shutdown`] stops intake and drains in-flight messages.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let concurrency = self.concurrency;
        let poll_interval = self.poll_interval;
        let worker = self;

        let handle = tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(concurrency));
            let mut idle_streak: u32 = 0;

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                let permit = tokio::select! {
                    permit = semaphore.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                    _ = shutdown_rx.changed() => continue,
                };

                let received = tokio::select! {
                    received = worker.queue.receive(&worker.worker_id) => received,
                    _ = shutdown_rx.changed() => {
                        drop(permit);
                        continue;
                    }
                };

                match received {
                    Ok(Some(delivery)) => {
                        idle_streak = 0;
                        let worker = worker.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            worker.process(delivery).await;
                        });
                    }
                    Ok(None) => {
                        drop(permit);
                        idle_streak = idle_streak.saturating_add(1);
                        let backoff = poll_interval
                            .mul_f64((1.5_f64).min(1.0 + idle_streak as f64 * 0.1));
                        tokio::select! {
                            _ = tokio::time::sleep(backoff) => {}
                            _ = shutdown_rx.changed() => {}
                        }
                    }
                    Err(e) => {
                        drop(permit);
                        tracing::error!(error = %e, "failed to poll queue");
                        tokio::select! {
                            _ = tokio::time::sleep(poll_interval) => {}
                            _ = shutdown_rx.changed() => {}
                        }
                    }
                }
            }

            // Every permit back means no message is still in flight; anything
            // unacknowledged at this point is redelivered by the queue.
            let _ = semaphore.acquire_many(concurrency as u32).await;
            tracing::info!("worker stopped");
        });

        tracing::info!("worker running");
        WorkerHandle {
            shutdown: shutdown_tx,
            handle,
        }
    }

    /// Receive and process at most one message.
    ///
    /// Returns whether a message was handled. This is the single step the
    /// pump loop repeats; it is public so hosts and tests can drive the
    /// worker deterministically.
    pub async fn run_once(&self) -> Result<bool, QueueError> {
        match self.queue.receive(&self.worker_id).await? {
            Some(delivery) => {
                self.process(delivery).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn process(&self, delivery: Delivery) {
        let message_id = delivery.message_id;

        let job = match delivery.job_reference() {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(%message_id, error = %e, "malformed queue message, dropping");
                self.complete(message_id).await;
                return;
            }
        };

        let span = tracing::info_span!(
            "delivery",
            record_id = %job.id,
            attempt = delivery.attempts,
        );
        async {
            match self.deliver(&job).await {
                Ok(Outcome::Sent) => {
                    tracing::info!("email sent");
                    self.complete(message_id).await;
                }
                Ok(Outcome::AlreadySent) => {
                    tracing::info!("record already marked sent, skipping");
                    self.complete(message_id).await;
                }
                Ok(Outcome::RecordMissing) => {
                    tracing::error!("no record for this reference, dropping message");
                    self.complete(message_id).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "delivery failed, returning message for retry");
                    if let Err(e) = self.queue.abandon(message_id).await {
                        tracing::error!(%message_id, error = %e, "failed to abandon message");
                    }
                }
            }
        }
        .instrument(span)
        .await;
    }

    /// Resolve the reference and transmit the email.
    ///
    /// On transport success the record is marked sent before this returns,
    /// i.e. before the caller acknowledges the queue message.
    async fn deliver(&self, job: &JobReference) -> Result<Outcome, WorkerError> {
        let key = job.record_key();

        let Some(record) = self.records.read(&key).await? else {
            return Ok(Outcome::RecordMissing);
        };
        if record.sent {
            return Ok(Outcome::AlreadySent);
        }

        let mut builder = Email::builder()
            .from(key.sender.as_str())
            .to_many(split_addresses(&record.to))
            .body(record.body.as_str());

        if let Some(cc) = &record.cc {
            builder = builder.cc_many(split_addresses(cc));
        }
        if let Some(bcc) = &record.bcc {
            builder = builder.bcc_many(split_addresses(bcc));
        }
        if let Some(subject) = &record.subject {
            builder = builder.subject(subject.as_str());
        }

        if let Some(refs) = &job.attachment_refs {
            tokio::fs::create_dir_all(&self.scratch_dir).await?;
            for name in split_refs(refs) {
                builder = builder.attachment(self.resolve_attachment(name).await?);
            }
        }

        let email = builder.build()?;
        self.mailer.send(&email).await?;

        self.records.mark_sent(&key).await?;
        Ok(Outcome::Sent)
    }

    async fn resolve_attachment(&self, name: &str) -> Result<AttachmentPart, WorkerError> {
        let path = self.attachments.read(name, &self.scratch_dir).await?;
        let content = tokio::fs::read(&path).await?;
        Ok(AttachmentPart::new(name, content))
    }

    async fn complete(&self, message_id: uuid::Uuid) {
        if let Err(e) = self.queue.complete(message_id).await {
            tracing::error!(%message_id, error = %e, "failed to complete message");
        }
    }
}

/// Handle to a started [`Worker`].
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop accepting new messages, wait for in-flight messages to finish,
    /// then return. Unacknowledged messages become redeliverable.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// Split a delimited address list into individual addresses.
fn split_addresses(list: &str) -> impl Iterator<Item = &str> {
    list.split(|c| c == ',' || c == ';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Resolves when the process receives SIGINT or SIGTERM; hosts pass this to
/// drive [`WorkerHandle::shutdown`].
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_addresses_accepts_both_delimiters() {
        let parts: Vec<&str> = split_addresses("a@x.com, b@x.com;c@x.com").collect();
        assert_eq!(parts, vec!["a@x.com", "b@x.com", "c@x.com"]);
    }

    #[test]
    fn split_addresses_drops_empty_segments() {
        let parts: Vec<&str> = split_addresses("a@x.com,,; ").collect();
        assert_eq!(parts, vec!["a@x.com"]);
    }
}
