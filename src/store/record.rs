use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::StoreError;

/// Key of one email record: the sending identity (partition) plus a unique
/// id generated at write time. Globally unique and immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub sender: String,
    pub id: Uuid,
}

/// Caller-supplied email fields, before a record key exists.
///
/// Address lists are single delimited strings (`,` or `;` separated), the
/// shape they arrive in from a form post. `cc`, `bcc`, and `subject` are
/// optional; an empty string at write time is stored as absent.
#[derive(Debug, Clone, Default)]
pub struct EmailFields {
    pub to: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: Option<String>,
    pub body: String,
}

/// One row of email metadata.
///
/// Created by the submission path with `sent == false`; flipped to `true` by
/// the worker after a successful transport send. Never deleted by this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecord {
    pub to: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: Option<String>,
    pub body: String,
    pub attachment_refs: Option<String>,
    pub sent: bool,
}

impl EmailRecord {
    fn from_fields(fields: EmailFields, attachment_refs: Option<String>) -> Self {
        Self {
            to: fields.to,
            cc: fields.cc.filter(|s| !s.is_empty()),
            bcc: fields.bcc.filter(|s| !s.is_empty()),
            subject: fields.subject.filter(|s| !s.is_empty()),
            body: fields.body,
            attachment_refs,
            sent: false,
        }
    }
}

/// Backend-agnostic email metadata storage.
///
/// The in-memory implementation below serves development and testing;
/// persistent backends (a SQL table, a cloud NoSQL table) implement the same
/// three operations, each mapping to a single query.
#[async_trait]
pub trait RecordStore: Send + Sync + Clone + 'static {
    /// Persist a new record with a freshly generated id and `sent == false`.
    ///
    /// Must be a single atomic insert: readers never observe a partial
    /// record. Returns the record's key.
    async fn write(
        &self,
        sender: &str,
        fields: EmailFields,
        attachment_refs: Option<String>,
    ) -> Result<RecordKey, StoreError>;

    /// Fetch a record, or `None` if the key is unknown.
    async fn read(&self, key: &RecordKey) -> Result<Option<EmailRecord>, StoreError>;

    /// Flip a record's `sent` flag to `true`.
    ///
    /// Idempotent; a missing key is a silent no-op, not a failure.
    async fn mark_sent(&self, key: &RecordKey) -> Result<(), StoreError>;
}

/// In-memory [`RecordStore`] for development and testing. Not durable.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    rows: Arc<Mutex<HashMap<RecordKey, EmailRecord>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn write(
        &self,
        sender: &str,
        fields: EmailFields,
        attachment_refs: Option<String>,
    ) -> Result<RecordKey, StoreError> {
        let key = RecordKey {
            sender: sender.to_string(),
            id: Uuid::new_v4(),
        };
        let record = EmailRecord::from_fields(fields, attachment_refs);

        let mut rows = self.rows.lock().await;
        rows.insert(key.clone(), record);
        Ok(key)
    }

    async fn read(&self, key: &RecordKey) -> Result<Option<EmailRecord>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows.get(key).cloned())
    }

    async fn mark_sent(&self, key: &RecordKey) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().await;
        if let Some(record) = rows.get_mut(key) {
            record.sent = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> EmailFields {
        EmailFields {
            to: "a@x.com".to_string(),
            body: "hi".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn read_after_write_returns_unsent_record() {
        let store = MemoryRecordStore::new();
        let key = store.write("sender@x.com", fields(), None).await.unwrap();

        assert_eq!(key.sender, "sender@x.com");
        let record = store.read(&key).await.unwrap().unwrap();
        assert_eq!(record.to, "a@x.com");
        assert_eq!(record.body, "hi");
        assert!(!record.sent);
        assert!(record.attachment_refs.is_none());
    }

    #[tokio::test]
    async fn empty_optional_fields_are_stored_as_absent() {
        let store = MemoryRecordStore::new();
        let key = store
            .write(
                "sender@x.com",
                EmailFields {
                    to: "a@x.com".to_string(),
                    cc: Some(String::new()),
                    subject: Some(String::new()),
                    body: "hi".to_string(),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        let record = store.read(&key).await.unwrap().unwrap();
        assert!(record.cc.is_none());
        assert!(record.bcc.is_none());
        assert!(record.subject.is_none());
    }

    #[tokio::test]
    async fn writes_generate_distinct_ids() {
        let store = MemoryRecordStore::new();
        let k1 = store.write("s@x.com", fields(), None).await.unwrap();
        let k2 = store.write("s@x.com", fields(), None).await.unwrap();
        assert_ne!(k1.id, k2.id);
    }

    #[tokio::test]
    async fn mark_sent_is_idempotent() {
        let store = MemoryRecordStore::new();
        let key = store.write("s@x.com", fields(), None).await.unwrap();

        store.mark_sent(&key).await.unwrap();
        store.mark_sent(&key).await.unwrap();

        assert!(store.read(&key).await.unwrap().unwrap().sent);
    }

    #[tokio::test]
    async fn mark_sent_on_missing_key_is_a_noop() {
        let store = MemoryRecordStore::new();
        let key = RecordKey {
            sender: "s@x.com".to_string(),
            id: Uuid::new_v4(),
        };
        store.mark_sent(&key).await.unwrap();
        assert!(store.read(&key).await.unwrap().is_none());
    }
}
