//! Durable storage for attachments and email metadata.
//!
//! Two backend-agnostic traits form the persistence seam:
//!
//! - [`BlobStore`] — named binary objects (uploaded attachments).
//! - [`RecordStore`] — one row of email metadata per submission.
//!
//! In-memory implementations ship for development and testing, plus a
//! filesystem blob store; cloud backends (S3, Azure Table/Blob, Postgres)
//! implement the same traits. Every client is a cheap `Clone` sharing state
//! behind an `Arc`: construct once, share everywhere.

mod blob;
mod record;

pub use blob::{Attachment, AttachmentStore, BlobStore, FsBlobStore, MemoryBlobStore};
pub(crate) use blob::split_refs;
pub use record::{EmailFields, EmailRecord, MemoryRecordStore, RecordKey, RecordStore};

/// The delimiter joining attachment names into one collated reference string.
///
/// This is a format contract: the same character separates names in the
/// stored record field and in the queue message. Names containing it would
/// split incorrectly on the worker side; callers are expected to avoid it.
pub const REF_DELIMITER: char = ',';

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
