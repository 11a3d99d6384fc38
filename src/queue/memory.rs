use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Delivery, JobQueue, JobReference, QueueError};

#[derive(Debug, Clone)]
struct QueuedMessage {
    id: Uuid,
    payload: serde_json::Value,
    attempts: u32,
    /// Earliest instant the message may be received (abandon backoff).
    available_at: OffsetDateTime,
    /// Present while a consumer holds the lease: (worker id, lease expiry).
    lease: Option<(String, OffsetDateTime)>,
}

impl QueuedMessage {
    fn receivable(&self, now: OffsetDateTime) -> bool {
        if self.available_at > now {
            return false;
        }
        match &self.lease {
            None => true,
            Some((_, expires)) => *expires <= now,
        }
    }
}

/// In-memory [`JobQueue`] for development and testing.
///
/// Implements the full lease lifecycle — exclusive receive, expiry-based
/// redelivery, abandon backoff — but is not durable: all messages are lost on
/// restart.
#[derive(Clone)]
pub struct MemoryJobQueue {
    messages: Arc<Mutex<Vec<QueuedMessage>>>,
    lease_duration: Duration,
    retry_delay: Duration,
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self {
            messages: Arc::new(Mutex::new(Vec::new())),
            lease_duration: Duration::from_secs(30),
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long a received message stays invisible to other consumers.
    pub fn lease_duration(mut self, d: Duration) -> Self {
        self.lease_duration = d;
        self
    }

    /// Redelivery delay applied when a message is abandoned.
    pub fn retry_delay(mut self, d: Duration) -> Self {
        self.retry_delay = d;
        self
    }

    /// Append a raw payload, bypassing [`JobReference`] serialization.
    ///
    /// Lets hosts and tests inject messages that do not parse as a job
    /// reference, which the worker must reject rather than retry.
    pub async fn push_raw(&self, payload: serde_json::Value) {
        let mut messages = self.messages.lock().await;
        messages.push(QueuedMessage {
            id: Uuid::new_v4(),
            payload,
            attempts: 0,
            available_at: OffsetDateTime::now_utc(),
            lease: None,
        });
    }

    /// Number of messages still on the queue (leased or not).
    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: &JobReference) -> Result<(), QueueError> {
        let payload = serde_json::to_value(job)?;
        self.push_raw(payload).await;
        Ok(())
    }

    async fn receive(&self, worker_id: &str) -> Result<Option<Delivery>, QueueError> {
        let mut messages = self.messages.lock().await;
        let now = OffsetDateTime::now_utc();

        let Some(msg) = messages.iter_mut().find(|m| m.receivable(now)) else {
            return Ok(None);
        };

        msg.attempts += 1;
        msg.lease = Some((worker_id.to_string(), now + self.lease_duration));

        Ok(Some(Delivery {
            message_id: msg.id,
            payload: msg.payload.clone(),
            attempts: msg.attempts,
        }))
    }

    async fn complete(&self, message_id: Uuid) -> Result<(), QueueError> {
        let mut messages = self.messages.lock().await;
        let before = messages.len();
        messages.retain(|m| m.id != message_id);
        if messages.len() == before {
            return Err(QueueError::UnknownMessage(message_id));
        }
        Ok(())
    }

    async fn abandon(&self, message_id: Uuid) -> Result<(), QueueError> {
        let mut messages = self.messages.lock().await;
        let msg = messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or(QueueError::UnknownMessage(message_id))?;
        msg.lease = None;
        msg.available_at = OffsetDateTime::now_utc() + self.retry_delay;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordKey;

    fn reference() -> JobReference {
        JobReference::new(
            &RecordKey {
                sender: "s@x.com".to_string(),
                id: Uuid::new_v4(),
            },
            None,
        )
    }

    #[tokio::test]
    async fn complete_removes_the_message() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(&reference()).await.unwrap();

        let delivery = queue.receive("w1").await.unwrap().unwrap();
        queue.complete(delivery.message_id).await.unwrap();

        assert!(queue.is_empty().await);
        assert!(queue.receive("w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn leased_message_is_invisible_to_other_consumers() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(&reference()).await.unwrap();

        let first = queue.receive("w1").await.unwrap();
        assert!(first.is_some());
        assert!(queue.receive("w2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn abandon_makes_the_message_redeliverable() {
        let queue = MemoryJobQueue::new().retry_delay(Duration::ZERO);
        queue.enqueue(&reference()).await.unwrap();

        let first = queue.receive("w1").await.unwrap().unwrap();
        queue.abandon(first.message_id).await.unwrap();

        let second = queue.receive("w2").await.unwrap().unwrap();
        assert_eq!(second.message_id, first.message_id);
        assert_eq!(second.attempts, 2);
    }

    #[tokio::test]
    async fn expired_lease_makes_the_message_redeliverable() {
        let queue = MemoryJobQueue::new().lease_duration(Duration::ZERO);
        queue.enqueue(&reference()).await.unwrap();

        // Consumer "dies" without completing or abandoning.
        let first = queue.receive("w1").await.unwrap().unwrap();

        let second = queue.receive("w2").await.unwrap().unwrap();
        assert_eq!(second.message_id, first.message_id);
    }

    #[tokio::test]
    async fn reference_roundtrips_through_the_payload() {
        let queue = MemoryJobQueue::new();
        let job = JobReference::new(
            &RecordKey {
                sender: "s@x.com".to_string(),
                id: Uuid::new_v4(),
            },
            Some("a.txt,b.txt".to_string()),
        );
        queue.enqueue(&job).await.unwrap();

        let delivery = queue.receive("w1").await.unwrap().unwrap();
        let parsed = delivery.job_reference().unwrap();
        assert_eq!(parsed.sender, job.sender);
        assert_eq!(parsed.id, job.id);
        assert_eq!(parsed.attachment_refs.as_deref(), Some("a.txt,b.txt"));
    }
}
