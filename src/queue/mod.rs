//! At-least-once job queue for email delivery references.
//!
//! The queue carries only [`JobReference`] payloads — identifiers, never the
//! email body or attachment bytes — so messages stay small regardless of
//! payload size. Delivery is at-least-once: a consumer leases a message with
//! [`JobQueue::receive`] and must terminate it with either
//! [`JobQueue::complete`] (permanent removal) or [`JobQueue::abandon`]
//! (requeue for redelivery after the queue's retry backoff). A consumer that
//! dies mid-lease simply lets the lease expire; the message becomes
//! receivable again.

mod memory;

pub use memory::MemoryJobQueue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::RecordKey;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown message id: {0}")]
    UnknownMessage(Uuid),
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

/// The unit carried on the queue: a pointer into the record store plus the
/// collated attachment reference string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReference {
    pub sender: String,
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_refs: Option<String>,
}

impl JobReference {
    pub fn new(key: &RecordKey, attachment_refs: Option<String>) -> Self {
        Self {
            sender: key.sender.clone(),
            id: key.id,
            attachment_refs,
        }
    }

    pub fn record_key(&self) -> RecordKey {
        RecordKey {
            sender: self.sender.clone(),
            id: self.id,
        }
    }
}

/// A leased message handed to a consumer.
///
/// The payload is raw JSON rather than a parsed [`JobReference`]: the worker
/// owns the decision of what to do with a payload that does not parse
/// (complete it — retrying cannot fix a malformed message).
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message_id: Uuid,
    pub payload: serde_json::Value,
    /// Delivery attempts so far, including this one.
    pub attempts: u32,
}

impl Delivery {
    /// Parse the payload as a [`JobReference`].
    pub fn job_reference(&self) -> Result<JobReference, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Backend-agnostic at-least-once queue transport.
///
/// Implementations provision their underlying resource lazily on first use
/// (the memory queue trivially, a broker-backed one by creating the queue if
/// it does not exist). Enqueue failures surface to the caller; there is no
/// internal retry.
#[async_trait]
pub trait JobQueue: Send + Sync + Clone + 'static {
    /// Append a job reference to the queue.
    async fn enqueue(&self, job: &JobReference) -> Result<(), QueueError>;

    /// Lease the next available message exclusively for `worker_id`, or
    /// `None` when nothing is receivable. The lease keeps other consumers
    /// from receiving the same message until it expires or the message is
    /// abandoned.
    async fn receive(&self, worker_id: &str) -> Result<Option<Delivery>, QueueError>;

    /// Permanently remove a leased message.
    async fn complete(&self, message_id: Uuid) -> Result<(), QueueError>;

    /// Release a leased message back to the queue for redelivery after the
    /// queue's retry backoff.
    async fn abandon(&self, message_id: Uuid) -> Result<(), QueueError>;
}
